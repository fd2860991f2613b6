//! Trim plans: the keep/removed partition of one episode's timeline.

use serde::{Deserialize, Serialize};

use crate::range::TimeRange;

/// Minimum total kept duration for a plan to be worth applying (seconds).
pub const MIN_KEPT_SECS: f64 = 0.5;

/// Tolerance for treating a sole keep segment as covering the full file.
pub const FULL_COVER_EPS: f64 = 1e-3;

/// Keep/removed segment lists for one episode.
///
/// Invariant: keep and removed ranges are pairwise disjoint and, up to a
/// small tolerance gap at dropped heads/tails, their union covers
/// `[0, duration]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrimPlan {
    /// Ranges to keep, in timeline order.
    pub keep: Vec<TimeRange>,
    /// Ranges removed from the timeline, in timeline order.
    pub removed: Vec<TimeRange>,
}

impl TrimPlan {
    /// Total duration of the keep segments.
    pub fn kept_duration(&self) -> f64 {
        self.keep.iter().map(TimeRange::duration).sum()
    }

    /// Total duration of the removed segments.
    pub fn removed_duration(&self) -> f64 {
        self.removed.iter().map(TimeRange::duration).sum()
    }

    /// Whether applying this plan would be a no-op.
    ///
    /// A plan is a no-op when the total kept duration is negligible
    /// (nothing meaningful would survive the cut) or when the sole keep
    /// segment already covers `[0, duration]` within tolerance (nothing
    /// would actually be removed). Callers return the original file
    /// unchanged in either case.
    pub fn is_noop(&self, duration: f64) -> bool {
        if self.kept_duration() <= MIN_KEPT_SECS {
            return true;
        }
        if self.keep.len() == 1 {
            let only = &self.keep[0];
            return only.start.abs() < FULL_COVER_EPS && (only.end - duration).abs() < FULL_COVER_EPS;
        }
        false
    }
}
