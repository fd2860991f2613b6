//! Encoder specifications and hardware capability flags.

use serde::{Deserialize, Serialize};

/// Default rate-control quality value.
pub const DEFAULT_QUALITY: u32 = 25;

/// CRF used for fast re-encode fallbacks of individual segments.
pub const SEGMENT_FALLBACK_CRF: u32 = 20;

/// Hardware encoder availability, supplied by the caller.
///
/// Hardware discovery is a collaborator concern; the engine only consumes
/// these flags.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HwCapabilities {
    /// NVIDIA NVENC available.
    pub nvenc: bool,
    /// Apple VideoToolbox available.
    pub videotoolbox: bool,
    /// Intel Quick Sync available.
    pub qsv: bool,
    /// VAAPI render device available.
    pub vaapi: bool,
}

impl HwCapabilities {
    /// No hardware encoders available.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Codec family, used to pick the matching CPU fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecFamily {
    H264,
    Hevc,
    Av1,
}

/// Rate-control mode and its FFmpeg flag.
///
/// Hardware paths use constant-quality modes; CPU paths use CRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateControl {
    /// NVENC constant quality (`-cq`).
    Cq,
    /// VideoToolbox quality scale (`-q:v`).
    VtQuality,
    /// Quick Sync global quality (`-global_quality`).
    GlobalQuality,
    /// VAAPI fixed QP (`-qp`).
    Qp,
    /// Software constant rate factor (`-crf`).
    Crf,
}

impl RateControl {
    /// The FFmpeg flag for this mode.
    pub fn flag(&self) -> &'static str {
        match self {
            RateControl::Cq => "-cq",
            RateControl::VtQuality => "-q:v",
            RateControl::GlobalQuality => "-global_quality",
            RateControl::Qp => "-qp",
            RateControl::Crf => "-crf",
        }
    }
}

/// A concrete encoder choice: codec, rate control, and the flags needed to
/// drive it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSpec {
    /// FFmpeg video codec name (e.g. "hevc_nvenc", "libx265").
    pub codec: String,
    /// Codec family for fallback matching.
    pub family: CodecFamily,
    /// Rate-control mode.
    pub rate_control: RateControl,
    /// Rate-control value.
    pub quality: u32,
    /// Encoder preset, where the codec takes one.
    pub preset: Option<String>,
    /// Whether this is a hardware encoder (eligible for CPU retry).
    pub hardware: bool,
    /// Arguments that must precede `-i` (hwaccel setup).
    pub input_args: Vec<String>,
    /// Additional codec-specific output arguments.
    pub extra_args: Vec<String>,
}

impl EncoderSpec {
    /// NVENC encoder.
    pub fn nvenc(family: CodecFamily, quality: u32) -> Self {
        let codec = match family {
            CodecFamily::H264 => "h264_nvenc",
            _ => "hevc_nvenc",
        };
        Self {
            codec: codec.to_string(),
            family: normalized(family),
            rate_control: RateControl::Cq,
            quality,
            preset: Some("fast".to_string()),
            hardware: true,
            input_args: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    /// Apple VideoToolbox encoder.
    pub fn videotoolbox(family: CodecFamily, quality: u32) -> Self {
        let codec = match family {
            CodecFamily::H264 => "h264_videotoolbox",
            _ => "hevc_videotoolbox",
        };
        Self {
            codec: codec.to_string(),
            family: normalized(family),
            rate_control: RateControl::VtQuality,
            quality,
            preset: None,
            hardware: true,
            input_args: vec!["-hwaccel".to_string(), "videotoolbox".to_string()],
            extra_args: vec![
                "-prio_speed".to_string(),
                "1".to_string(),
                "-spatial_aq".to_string(),
                "1".to_string(),
                "-power_efficient".to_string(),
                "0".to_string(),
            ],
        }
    }

    /// Intel Quick Sync encoder.
    pub fn qsv(family: CodecFamily, quality: u32) -> Self {
        let codec = match family {
            CodecFamily::H264 => "h264_qsv",
            _ => "hevc_qsv",
        };
        Self {
            codec: codec.to_string(),
            family: normalized(family),
            rate_control: RateControl::GlobalQuality,
            quality,
            preset: Some("fast".to_string()),
            hardware: true,
            input_args: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    /// VAAPI encoder.
    pub fn vaapi(quality: u32) -> Self {
        Self {
            codec: "hevc_vaapi".to_string(),
            family: CodecFamily::Hevc,
            rate_control: RateControl::Qp,
            quality,
            preset: None,
            hardware: true,
            input_args: vec![
                "-hwaccel".to_string(),
                "vaapi".to_string(),
                "-vaapi_device".to_string(),
                "/dev/dri/renderD128".to_string(),
            ],
            extra_args: Vec::new(),
        }
    }

    /// Software encoder for the given family.
    pub fn cpu(family: CodecFamily, quality: u32) -> Self {
        let (codec, preset) = match family {
            CodecFamily::H264 => ("libx264", Some("fast")),
            CodecFamily::Hevc => ("libx265", Some("fast")),
            CodecFamily::Av1 => ("libaom-av1", None),
        };
        Self {
            codec: codec.to_string(),
            family,
            rate_control: RateControl::Crf,
            quality,
            preset: preset.map(str::to_string),
            hardware: false,
            input_args: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    /// The CPU encoder matching this spec's codec family, for retrying a
    /// failed hardware encode.
    pub fn cpu_fallback(&self) -> EncoderSpec {
        match self.family {
            CodecFamily::H264 => Self::cpu(CodecFamily::H264, self.quality),
            _ => Self::cpu(CodecFamily::Hevc, self.quality),
        }
    }

    /// Video-codec output arguments (`-c:v ...` plus rate control).
    pub fn to_output_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];
        if let Some(preset) = &self.preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }
        args.push(self.rate_control.flag().to_string());
        args.push(self.quality.to_string());
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

// AV1 hardware paths are not offered; anything non-H264 maps to HEVC.
fn normalized(family: CodecFamily) -> CodecFamily {
    match family {
        CodecFamily::H264 => CodecFamily::H264,
        _ => CodecFamily::Hevc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_args() {
        let spec = EncoderSpec::cpu(CodecFamily::Hevc, 25);
        let args = spec.to_output_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx265".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"25".to_string()));
        assert!(!spec.hardware);
    }

    #[test]
    fn test_nvenc_uses_cq() {
        let spec = EncoderSpec::nvenc(CodecFamily::Hevc, 25);
        let args = spec.to_output_args();
        assert!(args.contains(&"hevc_nvenc".to_string()));
        assert!(args.contains(&"-cq".to_string()));
        assert!(!args.contains(&"-crf".to_string()));
        assert!(spec.hardware);
    }

    #[test]
    fn test_videotoolbox_hwaccel_before_input() {
        let spec = EncoderSpec::videotoolbox(CodecFamily::Hevc, 25);
        assert_eq!(spec.input_args[0], "-hwaccel");
        assert!(spec.to_output_args().contains(&"-q:v".to_string()));
    }

    #[test]
    fn test_cpu_fallback_matches_family() {
        let nv = EncoderSpec::nvenc(CodecFamily::H264, 23);
        assert_eq!(nv.cpu_fallback().codec, "libx264");

        let vt = EncoderSpec::videotoolbox(CodecFamily::Hevc, 23);
        let fb = vt.cpu_fallback();
        assert_eq!(fb.codec, "libx265");
        assert_eq!(fb.rate_control, RateControl::Crf);
        assert_eq!(fb.quality, 23);
    }
}
