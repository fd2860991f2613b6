//! Time ranges and detection results.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A time range in seconds, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
}

/// Errors from constructing a time range.
#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("range start cannot be negative: {0}")]
    NegativeStart(f64),

    #[error("range start {start} is after end {end}")]
    StartAfterEnd { start: f64, end: f64 },
}

impl TimeRange {
    /// Create a validated range. `0 <= start <= end` must hold.
    pub fn new(start: f64, end: f64) -> Result<Self, RangeError> {
        if start < 0.0 {
            return Err(RangeError::NegativeStart(start));
        }
        if start > end {
            return Err(RangeError::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    /// Duration of this range in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Clamp the range into `[0, duration]`.
    pub fn clamped(&self, duration: f64) -> TimeRange {
        let start = self.start.max(0.0).min(duration);
        let end = self.end.max(start).min(duration);
        TimeRange { start, end }
    }

    /// True when the range spans no time.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// True when `self` and `other` share any time.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A detected time range plus a similarity confidence in `[0, 1]`.
///
/// Intro and outro detections are independent; either may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// The detected range.
    pub range: TimeRange,
    /// Average pairwise (or template) similarity that produced this range.
    pub confidence: f64,
}

impl DetectionResult {
    /// Create a detection result, clamping confidence into `[0, 1]`.
    pub fn new(range: TimeRange, confidence: f64) -> Self {
        Self {
            range,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_invariants() {
        assert!(TimeRange::new(0.0, 30.0).is_ok());
        assert!(TimeRange::new(5.0, 5.0).is_ok());
        assert_eq!(
            TimeRange::new(-1.0, 5.0),
            Err(RangeError::NegativeStart(-1.0))
        );
        assert!(matches!(
            TimeRange::new(10.0, 5.0),
            Err(RangeError::StartAfterEnd { .. })
        ));
    }

    #[test]
    fn test_duration_and_clamp() {
        let r = TimeRange::new(10.0, 40.0).unwrap();
        assert!((r.duration() - 30.0).abs() < f64::EPSILON);

        let clamped = r.clamped(25.0);
        assert!((clamped.start - 10.0).abs() < f64::EPSILON);
        assert!((clamped.end - 25.0).abs() < f64::EPSILON);

        // Fully past the end collapses to an empty range at the boundary
        let past = TimeRange::new(30.0, 40.0).unwrap().clamped(20.0);
        assert!(past.is_empty());
    }

    #[test]
    fn test_overlaps() {
        let a = TimeRange::new(0.0, 30.0).unwrap();
        let b = TimeRange::new(20.0, 50.0).unwrap();
        let c = TimeRange::new(30.0, 60.0).unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // touching is not overlapping
    }

    #[test]
    fn test_confidence_clamped() {
        let r = TimeRange::new(0.0, 10.0).unwrap();
        assert_eq!(DetectionResult::new(r, 1.5).confidence, 1.0);
        assert_eq!(DetectionResult::new(r, -0.2).confidence, 0.0);
    }
}
