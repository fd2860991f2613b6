//! Per-episode template alignment.
//!
//! Episode timing drifts (cold opens, ad bumpers, slightly shifted
//! openings), so the shared template is slid over a bounded window of each
//! episode to find its best local offset.

use tracing::debug;

use opskip_media::AudioTrack;
use opskip_models::{DetectionResult, TimeRange};

use crate::fingerprint::{similarity, Fingerprinter, FRAME_HOP};
use crate::template::Template;

/// Slide `template` across `[search_start, search_end]` of the track and
/// return the best-scoring placement.
///
/// The template's duration is derived from its frame count and the fixed
/// frame hop. Returns `None` when no template is given or no full-length
/// window fits the search interval. Acceptance against the per-episode
/// threshold is the caller's decision.
pub fn align_template(
    track: &AudioTrack,
    template: Option<&Template>,
    search_start: f64,
    search_end: f64,
    hop_seconds: f64,
) -> Option<DetectionResult> {
    let template = template?;
    if track.samples.is_empty() {
        return None;
    }

    let sample_rate = track.sample_rate as f64;
    let template_secs = (template.ncols() * FRAME_HOP) as f64 / sample_rate;
    let template_samples = (template_secs * sample_rate) as usize;

    let search_start = search_start.max(0.0);
    let search_end = search_end.min(track.duration_secs());
    let hop = hop_seconds.max(f64::EPSILON);

    let fingerprinter = Fingerprinter::new(track.sample_rate);
    let mut best: Option<(f64, f64)> = None;

    let mut offset = search_start;
    // Candidate windows stay inside [search_start, search_end].
    while offset + template_secs <= search_end + 1e-9 {
        let start_idx = (offset * sample_rate) as usize;
        let end_idx = start_idx + template_samples;
        if end_idx > track.samples.len() {
            break;
        }

        if let Ok(print) = fingerprinter.compute(&track.samples[start_idx..end_idx]) {
            let score = similarity(&print, template);
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, offset));
            }
        }
        offset += hop;
    }

    let (score, start) = best?;
    debug!(
        source = %track.source.display(),
        start,
        score,
        template_secs,
        "Template aligned"
    );
    Some(DetectionResult::new(
        TimeRange {
            start,
            end: start + template_secs,
        },
        score,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SR: u32 = 4_000;

    fn add_sine(buf: &mut [f32], freq: f64, amplitude: f32) {
        for (i, s) in buf.iter_mut().enumerate() {
            *s += amplitude
                * (2.0 * std::f64::consts::PI * freq * i as f64 / SR as f64).sin() as f32;
        }
    }

    /// 40s track, silent except for a distinctive 5s motif at t=20.
    fn track_with_motif() -> AudioTrack {
        let mut samples = vec![0.0f32; 40 * SR as usize];
        let motif = &mut samples[20 * SR as usize..25 * SR as usize];
        add_sine(motif, 700.0, 0.5);
        add_sine(motif, 210.0, 0.3);
        AudioTrack {
            source: PathBuf::from("ep1.mkv"),
            sample_rate: SR,
            samples,
        }
    }

    #[test]
    fn test_align_finds_motif_within_search_window() {
        let track = track_with_motif();
        let fp = Fingerprinter::new(SR);
        let template = fp.compute(track.slice_secs(20.0, 25.0)).unwrap();
        let template_secs = (template.ncols() * FRAME_HOP) as f64 / SR as f64;

        let det = align_template(&track, Some(&template), 15.0, 25.0, 1.0)
            .expect("motif must be found");

        // Offset stays within [search_start, search_end - template].
        assert!(det.range.start >= 15.0);
        assert!(det.range.start <= 25.0 - template_secs + 1e-9);
        // And lands on the motif itself.
        assert!((det.range.start - 20.0).abs() < 1.5, "start {}", det.range.start);
        assert!(det.confidence > 0.9, "confidence {}", det.confidence);
    }

    #[test]
    fn test_align_without_template() {
        let track = track_with_motif();
        assert!(align_template(&track, None, 0.0, 40.0, 1.0).is_none());
    }

    #[test]
    fn test_align_window_too_small_for_template() {
        let track = track_with_motif();
        let fp = Fingerprinter::new(SR);
        let template = fp.compute(track.slice_secs(20.0, 25.0)).unwrap();

        // A 2s search interval cannot hold a 5s template.
        assert!(align_template(&track, Some(&template), 10.0, 12.0, 1.0).is_none());
    }

    #[test]
    fn test_align_empty_track() {
        let track = AudioTrack {
            source: PathBuf::from("ep1.mkv"),
            sample_rate: SR,
            samples: Vec::new(),
        };
        let template = Template::zeros((13, 40));
        assert!(align_template(&track, Some(&template), 0.0, 10.0, 1.0).is_none());
    }
}
