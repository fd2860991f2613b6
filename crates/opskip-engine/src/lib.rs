//! Detection-and-trim engine for episodic video.
//!
//! Given an ordered set of episodes, the engine discovers which time
//! ranges near the start and end are shared across episodes (candidate
//! intro/outro) by audio-fingerprint similarity, optionally aligns the
//! shared pattern to each episode's own timing, cuts the ranges out via
//! lossless extraction + concatenation (with re-encode fallback), and
//! merges the episodes into a single output with hardware/software
//! encoder fallback.
//!
//! The engine holds no process-wide state: every run receives its inputs,
//! a media-probe capability, a diagnostics sink, and a cancellation
//! signal from the caller.

pub mod align;
pub mod diag;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod pipeline;
pub mod scanner;
pub mod template;
pub mod trim;

pub use align::align_template;
pub use diag::{DiagLevel, DiagnosticsSink, NullSink, TracingSink};
pub use error::{EngineError, EngineResult, Stage};
pub use fingerprint::{similarity, FingerprintError, Fingerprinter};
pub use merge::{merge_episodes, select_encoder, EncoderSelection};
pub use pipeline::{BatchReport, Engine};
pub use scanner::{scan_shared_ranges, ScanOutcome};
pub use template::{build_templates, Template};
pub use trim::{apply_plan, plan_trim, TrimOutcome};
