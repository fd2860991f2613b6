//! Engine options and detection tuning.
//!
//! The similarity thresholds and window geometry are empirical values
//! carried over from the system this engine replaces. They are exposed as
//! configuration rather than constants so callers can re-tune them.

use serde::{Deserialize, Serialize};

use crate::encoding::DEFAULT_QUALITY;
use crate::range::TimeRange;

/// Tuning for intro/outro detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Analysis audio sample rate in Hz.
    pub sample_rate: u32,

    /// Maximum number of tracks sampled for the cross-episode scan; extra
    /// tracks are ignored for cost control.
    pub max_tracks: usize,

    /// Candidate window length in seconds.
    pub window_secs: f64,

    /// Step between candidate window positions in seconds.
    pub step_secs: f64,

    /// How far from the start (or end) of the episodes to scan, in seconds.
    pub scan_horizon_secs: f64,

    /// Candidate windows shorter than this after clamping are discarded.
    pub min_window_secs: f64,

    /// Track contributions shorter than this are skipped when averaging a
    /// template.
    pub min_template_secs: f64,

    /// Acceptance threshold for the cross-episode scan.
    ///
    /// Scores at or below this yield "no detection" rather than an error.
    pub cross_episode_threshold: f64,

    /// Acceptance threshold for per-episode template alignment. Looser
    /// than the cross-episode threshold: a single-episode signal is
    /// noisier than an averaged one.
    pub per_episode_threshold: f64,

    /// Step of the template slide during alignment, in seconds.
    pub align_hop_secs: f64,

    /// Per-episode intro alignment searches `[0, min(this, duration)]`.
    pub intro_search_secs: f64,

    /// Per-episode outro alignment searches
    /// `[max(0, duration - this), duration]`.
    pub outro_search_secs: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            max_tracks: 5,
            window_secs: 30.0,
            step_secs: 10.0,
            scan_horizon_secs: 90.0,
            min_window_secs: 20.0,
            min_template_secs: 5.0,
            cross_episode_threshold: 0.7,
            per_episode_threshold: 0.6,
            align_hop_secs: 1.0,
            intro_search_secs: 180.0,
            outro_search_secs: 240.0,
        }
    }
}

impl DetectionConfig {
    /// Builder-style setter for the cross-episode threshold.
    pub fn with_cross_episode_threshold(mut self, threshold: f64) -> Self {
        self.cross_episode_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Builder-style setter for the per-episode threshold.
    pub fn with_per_episode_threshold(mut self, threshold: f64) -> Self {
        self.per_episode_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Builder-style setter for the candidate window length.
    pub fn with_window_secs(mut self, secs: f64) -> Self {
        self.window_secs = secs;
        self
    }
}

/// Caller-supplied options for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Encoder selection strategy: "auto", "copy", or an explicit preset
    /// name (e.g. "hevc_nvenc", "cpu_h264").
    pub preset: String,

    /// Rate-control value passed to the selected encoder.
    pub quality: u32,

    /// Align the detected ranges to each episode individually instead of
    /// applying the shared ranges verbatim.
    pub per_episode_align: bool,

    /// Delete generated intermediates (analysis audio, segment parts,
    /// removed-range exports) after a verified merge.
    pub cleanup_residuals: bool,

    /// Delete all source episode files other than the produced output
    /// after a verified merge.
    pub only_keep_outputs: bool,

    /// Export each removed range as an independent clip for audit.
    pub export_removed: bool,

    /// Manual intro override; skips intro detection when set.
    pub intro_override: Option<TimeRange>,

    /// Manual outro override; skips outro detection when set.
    pub outro_override: Option<TimeRange>,

    /// Detection tuning.
    pub detection: DetectionConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            preset: "auto".to_string(),
            quality: DEFAULT_QUALITY,
            per_episode_align: false,
            cleanup_residuals: true,
            only_keep_outputs: false,
            export_removed: false,
            intro_override: None,
            outro_override: None,
            detection: DetectionConfig::default(),
        }
    }
}

impl EngineOptions {
    /// Builder-style setter for the encoder preset.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }

    /// Builder-style setter for the quality value.
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    /// Builder-style setter for per-episode alignment.
    pub fn with_per_episode_align(mut self, enabled: bool) -> Self {
        self.per_episode_align = enabled;
        self
    }

    /// Builder-style setter for manual range overrides.
    pub fn with_overrides(
        mut self,
        intro: Option<TimeRange>,
        outro: Option<TimeRange>,
    ) -> Self {
        self.intro_override = intro;
        self.outro_override = outro;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = DetectionConfig::default();
        assert!((config.cross_episode_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.per_episode_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.max_tracks, 5);
    }

    #[test]
    fn test_threshold_clamping() {
        let config = DetectionConfig::default().with_cross_episode_threshold(1.5);
        assert!((config.cross_episode_threshold - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_options_builder() {
        let options = EngineOptions::default()
            .with_preset("copy")
            .with_quality(23)
            .with_per_episode_align(true);
        assert_eq!(options.preset, "copy");
        assert_eq!(options.quality, 23);
        assert!(options.per_episode_align);
        assert!(options.cleanup_residuals);
    }
}
