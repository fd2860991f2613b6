//! Shared data models for the opskip engine.
//!
//! This crate provides Serde-serializable types for:
//! - Time ranges and detection results
//! - Episodes and per-episode detection previews
//! - Trim plans (keep/removed segment partitions)
//! - Encoder specifications and hardware capability flags
//! - Engine options and detection tuning

pub mod encoding;
pub mod episode;
pub mod options;
pub mod plan;
pub mod range;
pub mod timestamp;

// Re-export common types
pub use encoding::{CodecFamily, EncoderSpec, HwCapabilities, RateControl};
pub use episode::{DetectionPreview, Episode};
pub use options::{DetectionConfig, EngineOptions};
pub use plan::TrimPlan;
pub use range::{DetectionResult, RangeError, TimeRange};
pub use timestamp::format_seconds;
