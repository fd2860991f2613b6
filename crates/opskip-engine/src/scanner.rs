//! Cross-episode scan for shared intro/outro ranges.
//!
//! Candidate windows near the start (and end) of the sampled episodes are
//! fingerprinted per track and scored by average pairwise similarity. The
//! best-scoring window is accepted only above the configured threshold;
//! anything below yields "no detection", which is not an error.

use ndarray::Array2;
use tracing::debug;

use opskip_media::AudioTrack;
use opskip_models::{DetectionConfig, DetectionResult, TimeRange};

use crate::fingerprint::{similarity, Fingerprinter};

/// Result of one cross-episode scan. Intro and outro are independent.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub intro: Option<DetectionResult>,
    pub outro: Option<DetectionResult>,
}

/// Scan the sampled tracks for shared intro and outro ranges.
///
/// At most `config.max_tracks` tracks are considered; fewer than two
/// tracks cannot be compared and yield no detections.
pub fn scan_shared_ranges(tracks: &[AudioTrack], config: &DetectionConfig) -> ScanOutcome {
    let tracks = &tracks[..tracks.len().min(config.max_tracks)];
    if tracks.len() < 2 {
        debug!(tracks = tracks.len(), "Not enough tracks for pattern detection");
        return ScanOutcome::default();
    }

    let min_duration = tracks
        .iter()
        .map(AudioTrack::duration_secs)
        .fold(f64::INFINITY, f64::min);
    let fingerprinter = Fingerprinter::new(tracks[0].sample_rate);

    let mut best_intro: Option<DetectionResult> = None;
    let intro_horizon = config.scan_horizon_secs.min(min_duration);
    let mut start = 0.0;
    while start < intro_horizon {
        let end = (start + config.window_secs).min(min_duration);
        consider_window(
            tracks,
            &fingerprinter,
            start,
            end,
            config.min_window_secs,
            &mut best_intro,
        );
        start += config.step_secs;
    }

    let mut best_outro: Option<DetectionResult> = None;
    let outro_floor = (min_duration - config.scan_horizon_secs).max(0.0);
    let mut end = min_duration;
    while end > outro_floor {
        let start = (end - config.window_secs).max(0.0);
        consider_window(
            tracks,
            &fingerprinter,
            start,
            end,
            config.min_window_secs,
            &mut best_outro,
        );
        end -= config.step_secs;
    }

    let outcome = ScanOutcome {
        intro: accept(best_intro, config.cross_episode_threshold, "intro"),
        outro: accept(best_outro, config.cross_episode_threshold, "outro"),
    };

    debug!(
        intro = ?outcome.intro,
        outro = ?outcome.outro,
        min_duration,
        "Cross-episode scan complete"
    );
    outcome
}

/// Score one candidate window and keep it if it beats the current best.
fn consider_window(
    tracks: &[AudioTrack],
    fingerprinter: &Fingerprinter,
    start: f64,
    end: f64,
    min_window_secs: f64,
    best: &mut Option<DetectionResult>,
) {
    if end - start < min_window_secs {
        return;
    }
    let Some(score) = window_score(tracks, fingerprinter, start, end) else {
        return;
    };
    if best.map_or(true, |b| score > b.confidence) {
        *best = Some(DetectionResult::new(
            TimeRange { start, end },
            score,
        ));
    }
}

/// Average pairwise similarity of the tracks' fingerprints for a window.
fn window_score(
    tracks: &[AudioTrack],
    fingerprinter: &Fingerprinter,
    start: f64,
    end: f64,
) -> Option<f64> {
    let prints: Vec<Array2<f32>> = tracks
        .iter()
        .filter_map(|t| fingerprinter.compute(t.slice_secs(start, end)).ok())
        .collect();
    if prints.len() < 2 {
        return None;
    }

    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..prints.len() {
        for j in (i + 1)..prints.len() {
            sum += similarity(&prints[i], &prints[j]);
            pairs += 1;
        }
    }
    Some(sum / pairs as f64)
}

/// Apply the acceptance threshold; below it the candidate is discarded.
fn accept(
    candidate: Option<DetectionResult>,
    threshold: f64,
    kind: &str,
) -> Option<DetectionResult> {
    match candidate {
        Some(det) if det.confidence > threshold => Some(det),
        Some(det) => {
            debug!(
                kind,
                confidence = det.confidence,
                threshold,
                "Best candidate below threshold"
            );
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SR: u32 = 4_000;

    fn track(samples: Vec<f32>, name: &str) -> AudioTrack {
        AudioTrack {
            source: PathBuf::from(name),
            sample_rate: SR,
            samples,
        }
    }

    fn add_sine(buf: &mut [f32], freq: f64, amplitude: f32) {
        for (i, s) in buf.iter_mut().enumerate() {
            *s += amplitude
                * (2.0 * std::f64::consts::PI * freq * i as f64 / SR as f64).sin() as f32;
        }
    }

    /// Shared "opening theme": a fixed chord.
    fn intro_samples(secs: f64) -> Vec<f32> {
        let mut buf = vec![0.0f32; (secs * SR as f64) as usize];
        add_sine(&mut buf, 220.0, 0.4);
        add_sine(&mut buf, 330.0, 0.3);
        add_sine(&mut buf, 495.0, 0.2);
        buf
    }

    /// Broadband low-frequency content, spectrally unlike silence.
    fn busy_samples(secs: f64) -> Vec<f32> {
        let mut buf = vec![0.0f32; (secs * SR as f64) as usize];
        for k in 1..=19 {
            add_sine(&mut buf, 50.0 * k as f64, 0.3);
        }
        buf
    }

    #[test]
    fn test_scan_detects_shared_intro_only() {
        // Both episodes open with the same 30s theme, then diverge hard:
        // one goes quiet, the other stays busy.
        let mut a = intro_samples(30.0);
        a.extend(vec![0.0f32; (120.0 * SR as f64) as usize]);
        let mut b = intro_samples(30.0);
        b.extend(busy_samples(120.0));

        let tracks = vec![track(a, "ep1.mkv"), track(b, "ep2.mkv")];
        let outcome = scan_shared_ranges(&tracks, &DetectionConfig::default());

        let intro = outcome.intro.expect("shared intro must be detected");
        assert!(intro.confidence > 0.7, "confidence {}", intro.confidence);
        assert!(
            intro.range.overlaps(&TimeRange { start: 0.0, end: 30.0 }),
            "detected {:?} does not overlap the shared opening",
            intro.range
        );

        // The tails have nothing in common, so the mirrored scan must not
        // clear the threshold.
        assert!(outcome.outro.is_none(), "outro {:?}", outcome.outro);
    }

    #[test]
    fn test_single_track_yields_nothing() {
        let tracks = vec![track(intro_samples(60.0), "ep1.mkv")];
        let outcome = scan_shared_ranges(&tracks, &DetectionConfig::default());
        assert!(outcome.intro.is_none());
        assert!(outcome.outro.is_none());
    }

    #[test]
    fn test_track_cap_is_enforced() {
        // Six identical tracks: the scan must still succeed while only
        // sampling the configured maximum.
        let tracks: Vec<AudioTrack> = (0..6)
            .map(|i| {
                let mut samples = intro_samples(30.0);
                samples.extend(vec![0.0f32; (10.0 * SR as f64) as usize]);
                track(samples, &format!("ep{i}.mkv"))
            })
            .collect();

        let config = DetectionConfig::default();
        let outcome = scan_shared_ranges(&tracks, &config);
        assert!(outcome.intro.is_some());
    }
}
