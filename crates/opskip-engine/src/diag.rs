//! Diagnostics sink injected by the caller.
//!
//! The engine reports human-readable progress lines through this seam so
//! the surrounding application can surface them (terminal pane, UI log,
//! ...) without the engine knowing anything about presentation.

use tracing::{error, info, warn};

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Receiver for engine diagnostics.
pub trait DiagnosticsSink: Send + Sync {
    /// Report one line.
    fn line(&self, level: DiagLevel, message: &str);

    fn info(&self, message: &str) {
        self.line(DiagLevel::Info, message);
    }

    fn success(&self, message: &str) {
        self.line(DiagLevel::Success, message);
    }

    fn warning(&self, message: &str) {
        self.line(DiagLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.line(DiagLevel::Error, message);
    }
}

/// Sink that forwards lines to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn line(&self, level: DiagLevel, message: &str) {
        match level {
            DiagLevel::Info | DiagLevel::Success => info!("{}", message),
            DiagLevel::Warning => warn!("{}", message),
            DiagLevel::Error => error!("{}", message),
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn line(&self, _level: DiagLevel, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<(DiagLevel, String)>>);

    impl DiagnosticsSink for Recorder {
        fn line(&self, level: DiagLevel, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_convenience_levels() {
        let sink = Recorder(Mutex::new(Vec::new()));
        sink.info("starting");
        sink.warning("low confidence");
        sink.success("done");

        let lines = sink.0.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].0, DiagLevel::Info);
        assert_eq!(lines[1].0, DiagLevel::Warning);
        assert_eq!(lines[2].0, DiagLevel::Success);
    }
}
