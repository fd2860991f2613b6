//! Episodes and per-episode detection previews.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::range::TimeRange;

/// One episode in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Source video path. Never mutated by the engine.
    pub path: PathBuf,
    /// Probed duration in seconds.
    pub duration: f64,
    /// Intro range to remove, possibly per-episode aligned.
    pub intro: Option<TimeRange>,
    /// Outro range to remove, possibly per-episode aligned.
    pub outro: Option<TimeRange>,
    /// Path of the trimmed copy, once produced. Equal to `path` when the
    /// trim was a no-op.
    pub trimmed_path: Option<PathBuf>,
}

impl Episode {
    /// Create an episode with no resolved ranges yet.
    pub fn new(path: PathBuf, duration: f64) -> Self {
        Self {
            path,
            duration,
            intro: None,
            outro: None,
            trimmed_path: None,
        }
    }

    /// The file to feed into the merge: the trimmed copy when one was
    /// produced, the source otherwise.
    pub fn merge_input(&self) -> &PathBuf {
        self.trimmed_path.as_ref().unwrap_or(&self.path)
    }

    /// File name for diagnostics.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Per-episode detection record for display by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPreview {
    /// Episode file name.
    pub file: String,
    /// Aligned intro range, if any.
    pub intro: Option<TimeRange>,
    /// Intro alignment confidence (0.0 when no intro was found).
    pub intro_confidence: f64,
    /// Aligned outro range, if any.
    pub outro: Option<TimeRange>,
    /// Outro alignment confidence (0.0 when no outro was found).
    pub outro_confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_input_prefers_trimmed() {
        let mut ep = Episode::new(PathBuf::from("/data/ep01.mkv"), 1420.0);
        assert_eq!(ep.merge_input(), &PathBuf::from("/data/ep01.mkv"));

        ep.trimmed_path = Some(PathBuf::from("/data/trimmed/ep01.trimmed.mp4"));
        assert_eq!(
            ep.merge_input(),
            &PathBuf::from("/data/trimmed/ep01.trimmed.mp4")
        );
    }

    #[test]
    fn test_preview_serializes() {
        let preview = DetectionPreview {
            file: "ep01.mkv".to_string(),
            intro: Some(TimeRange::new(0.0, 30.0).unwrap()),
            intro_confidence: 0.91,
            outro: None,
            outro_confidence: 0.0,
        };
        let json = serde_json::to_string(&preview).unwrap();
        assert!(json.contains("ep01.mkv"));
        assert!(json.contains("0.91"));
    }
}
