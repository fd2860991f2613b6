//! Engine error taxonomy.
//!
//! Low-confidence detection is deliberately NOT represented here: it
//! yields absent ranges, and the caller may supply manual ranges instead.
//! Every fatal condition carries a diagnostic string and maps to the
//! pipeline stage at which it occurred.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::watch;

use crate::fingerprint::FingerprintError;
use opskip_media::MediaError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Pipeline stage, reported alongside fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Detect,
    Trim,
    Concat,
    Merge,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Probe => "probe",
            Stage::Detect => "detect",
            Stage::Trim => "trim",
            Stage::Concat => "concat",
            Stage::Merge => "merge",
        };
        write!(f, "{}", name)
    }
}

/// Errors that abort a batch run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },

    #[error("segment extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("concatenation failed for {path}: {message}")]
    Concat { path: PathBuf, message: String },

    #[error("encoding failed: {message}")]
    Encode { message: String },

    #[error("no episodes to process")]
    NoEpisodes,

    #[error("batch cancelled")]
    Cancelled,

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Create a probe failure.
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an extraction failure.
    pub fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a concatenation failure.
    pub fn concat(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Concat {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an encode failure.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Probe { .. } | Self::NoEpisodes => Stage::Probe,
            Self::Fingerprint(_) => Stage::Detect,
            Self::Extraction { .. } => Stage::Trim,
            Self::Concat { .. } => Stage::Concat,
            Self::Encode { .. } => Stage::Merge,
            Self::Cancelled | Self::Media(_) | Self::Io(_) => Stage::Trim,
        }
    }

    /// True when the run was stopped by the caller rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Media(MediaError::Cancelled))
    }
}

/// Fail fast when the caller has raised the cancellation flag.
///
/// Polled between episodes and between segment operations so a stop
/// request is honored without waiting for the current batch to finish.
pub(crate) fn check_cancel(cancel: Option<&watch::Receiver<bool>>) -> EngineResult<()> {
    match cancel {
        Some(rx) if *rx.borrow() => Err(EngineError::Cancelled),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(EngineError::probe("a.mkv", "no duration").stage(), Stage::Probe);
        assert_eq!(EngineError::extraction("a.mkv", "x").stage(), Stage::Trim);
        assert_eq!(EngineError::concat("a.mkv", "x").stage(), Stage::Concat);
        assert_eq!(EngineError::encode("x").stage(), Stage::Merge);
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(EngineError::Media(MediaError::Cancelled).is_cancelled());
        assert!(!EngineError::encode("x").is_cancelled());
    }

    #[test]
    fn test_diagnostic_strings_name_the_path() {
        let err = EngineError::extraction("/data/ep03.mkv", "segment 2 failed");
        let msg = err.to_string();
        assert!(msg.contains("ep03.mkv"));
        assert!(msg.contains("segment 2"));
    }
}
