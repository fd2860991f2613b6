//! Final merge: encoder selection and concatenation with fallback.
//!
//! Selection follows a fixed priority order over the caller-supplied
//! hardware capability flags; run-time hardware failures are recognized
//! from tool diagnostics and retried once on the matching CPU codec
//! family. Fallbacks are ordered attempts, not nested conditionals.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use opskip_media::{concat_list_content, verify_output, FfmpegCommand, FfmpegRunner, MediaError};
use opskip_models::{CodecFamily, EncoderSpec, HwCapabilities};

use crate::diag::DiagnosticsSink;
use crate::error::{check_cancel, EngineError, EngineResult};

/// Timeout for the final merge invocation.
const MERGE_TIMEOUT_SECS: u64 = 3600;

/// Stderr markers meaning "this hardware path is not actually usable".
/// Matched case-insensitively against the tool diagnostics.
const HW_FAILURE_MARKERS: [&str; 3] = [
    "no capable devices found",
    "openencodesessionex failed",
    "videotoolbox",
];

/// Outcome of encoder selection.
#[derive(Debug, Clone)]
pub enum EncoderSelection {
    /// Try zero-re-encode concatenation first (plain file copy for a
    /// single input); re-encode with the inner spec only if that fails.
    CopyFirst { fallback: EncoderSpec },
    /// Encode with the given spec.
    Encode(EncoderSpec),
}

impl EncoderSelection {
    /// The spec that would be used for an encode, for inspection.
    pub fn spec(&self) -> &EncoderSpec {
        match self {
            EncoderSelection::CopyFirst { fallback } => fallback,
            EncoderSelection::Encode(spec) => spec,
        }
    }
}

/// Map a preset name and the hardware capability flags to an encoder.
///
/// `"auto"` walks the hardware priority order and falls back to the CPU
/// profile when nothing is available. `"copy"` defers re-encoding until a
/// stream-copy concat has actually failed. Explicit names map to one
/// encoder + rate-control pair; unknown names get the CPU default.
pub fn select_encoder(preset: &str, quality: u32, hw: &HwCapabilities) -> EncoderSelection {
    use EncoderSelection::*;

    match preset {
        "copy" => CopyFirst {
            fallback: EncoderSpec::cpu(CodecFamily::H264, quality),
        },
        "auto" => {
            let spec = if hw.nvenc {
                EncoderSpec::nvenc(CodecFamily::Hevc, quality)
            } else if hw.videotoolbox {
                EncoderSpec::videotoolbox(CodecFamily::Hevc, quality)
            } else if hw.qsv {
                EncoderSpec::qsv(CodecFamily::Hevc, quality)
            } else if hw.vaapi {
                EncoderSpec::vaapi(quality)
            } else {
                EncoderSpec::cpu(CodecFamily::Hevc, quality)
            };
            Encode(spec)
        }
        "h264_nvenc" => Encode(EncoderSpec::nvenc(CodecFamily::H264, quality)),
        "hevc_nvenc" | "h265_nvenc" => Encode(EncoderSpec::nvenc(CodecFamily::Hevc, quality)),
        "h264_videotoolbox" => Encode(EncoderSpec::videotoolbox(CodecFamily::H264, quality)),
        "hevc_videotoolbox" | "h265_videotoolbox" => {
            Encode(EncoderSpec::videotoolbox(CodecFamily::Hevc, quality))
        }
        "h264_qsv" => Encode(EncoderSpec::qsv(CodecFamily::H264, quality)),
        "hevc_qsv" | "h265_qsv" => Encode(EncoderSpec::qsv(CodecFamily::Hevc, quality)),
        "hevc_vaapi" | "h265_vaapi" | "vaapi" => Encode(EncoderSpec::vaapi(quality)),
        "cpu_h264" => Encode(EncoderSpec::cpu(CodecFamily::H264, quality)),
        "cpu_h265" | "cpu_hevc" => Encode(EncoderSpec::cpu(CodecFamily::Hevc, quality)),
        "cpu_av1" => Encode(EncoderSpec::cpu(CodecFamily::Av1, quality)),
        other => {
            warn!(preset = other, "Unknown encoder preset, using CPU default");
            Encode(EncoderSpec::cpu(CodecFamily::Hevc, quality))
        }
    }
}

/// Concatenate the inputs into `output` using the selected encoder.
///
/// The concat list file is written into `work_dir` and removed again on
/// success. The produced output is verified to exist and be non-empty; a
/// declared success with an empty file is a failure.
pub async fn merge_episodes(
    inputs: &[PathBuf],
    output: &Path,
    selection: &EncoderSelection,
    work_dir: &Path,
    cancel: Option<&watch::Receiver<bool>>,
    sink: &dyn DiagnosticsSink,
) -> EngineResult<()> {
    if inputs.is_empty() {
        return Err(EngineError::encode("no inputs to merge"));
    }
    check_cancel(cancel)?;

    let mut runner = FfmpegRunner::new().with_timeout(MERGE_TIMEOUT_SECS);
    if let Some(rx) = cancel {
        runner = runner.with_cancel(rx.clone());
    }

    // Single input under "copy": a plain file copy needs no tool at all.
    if let EncoderSelection::CopyFirst { .. } = selection {
        if inputs.len() == 1 {
            match copy_single(&inputs[0], output).await {
                Ok(()) => {
                    sink.success("Copied single file to output (no re-encode)");
                    return Ok(());
                }
                Err(e) => {
                    sink.warning(&format!("Copy failed, will try concat/encode: {}", e));
                }
            }
        }
    }

    let list_path = work_dir.join("filelist.txt");
    tokio::fs::write(&list_path, concat_list_content(inputs)).await?;

    let result = match selection {
        EncoderSelection::CopyFirst { fallback } => {
            sink.info("Attempting concat with stream copy (-c copy)");
            match run_concat_copy(&list_path, output, &runner).await {
                Ok(()) => Ok(()),
                Err(MediaError::Cancelled) => Err(EngineError::Cancelled),
                Err(e) => {
                    sink.warning(
                        "Concat with copy failed; falling back to re-encode for compatibility",
                    );
                    debug!(error = %e, "Stream-copy concat failure");
                    run_encode(&list_path, output, fallback, &runner, sink).await
                }
            }
        }
        EncoderSelection::Encode(spec) => run_encode(&list_path, output, spec, &runner, sink).await,
    };
    result?;

    verify_output(output)
        .await
        .map_err(|e| EngineError::encode(format!("merge output unusable: {}", e)))?;

    // Keep trimmed parts for reuse; the list file is merge-local.
    let _ = tokio::fs::remove_file(&list_path).await;

    info!(output = %output.display(), inputs = inputs.len(), "Merge complete");
    Ok(())
}

async fn copy_single(input: &Path, output: &Path) -> EngineResult<()> {
    tokio::fs::copy(input, output).await?;
    verify_output(output)
        .await
        .map_err(|e| EngineError::encode(e.to_string()))
}

async fn run_concat_copy(
    list_path: &Path,
    output: &Path,
    runner: &FfmpegRunner,
) -> Result<(), MediaError> {
    let cmd = FfmpegCommand::new(list_path, output)
        .concat_demuxer()
        .codec_copy();
    runner.run(&cmd).await?;
    verify_output(output).await
}

/// Run one encode, retrying once on the CPU when the hardware path turns
/// out to be unusable at run time.
async fn run_encode(
    list_path: &Path,
    output: &Path,
    spec: &EncoderSpec,
    runner: &FfmpegRunner,
    sink: &dyn DiagnosticsSink,
) -> EngineResult<()> {
    sink.info(&format!("Using encoder: {}", spec.codec));

    match run_encode_once(list_path, output, spec, runner).await {
        Ok(()) => Ok(()),
        Err(MediaError::Cancelled) => Err(EngineError::Cancelled),
        Err(e) if spec.hardware && is_hw_failure(&e) => {
            sink.warning("Hardware acceleration failed, trying CPU fallback...");
            let fallback = spec.cpu_fallback();
            sink.info(&format!("Fallback encoder: {}", fallback.codec));
            run_encode_once(list_path, output, &fallback, runner)
                .await
                .map_err(|e| EngineError::encode(e.to_string()))
        }
        Err(e) => Err(EngineError::encode(e.to_string())),
    }
}

async fn run_encode_once(
    list_path: &Path,
    output: &Path,
    spec: &EncoderSpec,
    runner: &FfmpegRunner,
) -> Result<(), MediaError> {
    let cmd = FfmpegCommand::new(list_path, output)
        .concat_demuxer()
        .input_args(spec.input_args.iter().cloned())
        .output_args(spec.to_output_args())
        .audio_codec("copy");
    runner.run(&cmd).await?;
    verify_output(output).await
}

/// Whether a failure's diagnostics name a missing hardware capability.
fn is_hw_failure(error: &MediaError) -> bool {
    let Some(stderr) = error.stderr() else {
        return false;
    };
    let stderr = stderr.to_lowercase();
    HW_FAILURE_MARKERS.iter().any(|m| stderr.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opskip_models::RateControl;

    #[test]
    fn test_auto_without_hardware_is_cpu() {
        let selection = select_encoder("auto", 25, &HwCapabilities::none());
        let EncoderSelection::Encode(spec) = selection else {
            panic!("auto must encode");
        };
        assert_eq!(spec.codec, "libx265");
        assert_eq!(spec.rate_control, RateControl::Crf);
        assert!(!spec.hardware);
    }

    #[test]
    fn test_auto_priority_order() {
        let all = HwCapabilities {
            nvenc: true,
            videotoolbox: true,
            qsv: true,
            vaapi: true,
        };
        assert_eq!(select_encoder("auto", 25, &all).spec().codec, "hevc_nvenc");

        let no_nvenc = HwCapabilities { nvenc: false, ..all };
        assert_eq!(
            select_encoder("auto", 25, &no_nvenc).spec().codec,
            "hevc_videotoolbox"
        );

        let only_vaapi = HwCapabilities {
            vaapi: true,
            ..HwCapabilities::none()
        };
        assert_eq!(
            select_encoder("auto", 25, &only_vaapi).spec().codec,
            "hevc_vaapi"
        );
    }

    #[test]
    fn test_copy_preset_defers_reencode() {
        let selection = select_encoder("copy", 25, &HwCapabilities::none());
        let EncoderSelection::CopyFirst { fallback } = selection else {
            panic!("copy must try stream copy first");
        };
        assert_eq!(fallback.codec, "libx264");
    }

    #[test]
    fn test_explicit_presets() {
        let hw = HwCapabilities::none();
        assert_eq!(select_encoder("h264_nvenc", 25, &hw).spec().codec, "h264_nvenc");
        assert_eq!(select_encoder("h265_qsv", 25, &hw).spec().codec, "hevc_qsv");
        assert_eq!(select_encoder("cpu_av1", 25, &hw).spec().codec, "libaom-av1");
        // Unknown names degrade to the CPU default rather than failing.
        assert_eq!(select_encoder("fancy_future", 25, &hw).spec().codec, "libx265");
    }

    #[test]
    fn test_hw_failure_markers() {
        let hw_err = MediaError::ffmpeg_failed(
            "encode failed",
            Some("[hevc_nvenc] No capable devices found".to_string()),
            Some(1),
        );
        assert!(is_hw_failure(&hw_err));

        let vt_err = MediaError::ffmpeg_failed(
            "encode failed",
            Some("Error while opening encoder - VideoToolbox session".to_string()),
            Some(1),
        );
        assert!(is_hw_failure(&vt_err));

        let plain = MediaError::ffmpeg_failed(
            "encode failed",
            Some("invalid argument".to_string()),
            Some(1),
        );
        assert!(!is_hw_failure(&plain));

        assert!(!is_hw_failure(&MediaError::Cancelled));
    }
}
