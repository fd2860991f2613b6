//! Canonical intro/outro templates averaged across episodes.

use ndarray::Array2;
use tracing::debug;

use opskip_media::AudioTrack;
use opskip_models::{DetectionConfig, TimeRange};

use crate::fingerprint::Fingerprinter;

/// An averaged fingerprint representing one range type across the sampled
/// episodes. Scoped to a single batch run.
pub type Template = Array2<f32>;

/// Build intro/outro templates by averaging each track's fingerprint of
/// the given ranges.
///
/// Tracks contributing less than `config.min_template_secs` of audio for a
/// range are skipped. A range type with no surviving contributions yields
/// `None`.
pub fn build_templates(
    tracks: &[AudioTrack],
    intro: Option<TimeRange>,
    outro: Option<TimeRange>,
    config: &DetectionConfig,
) -> (Option<Template>, Option<Template>) {
    if tracks.is_empty() {
        return (None, None);
    }
    let fingerprinter = Fingerprinter::new(tracks[0].sample_rate);

    let intro_template = intro.and_then(|r| build_one(tracks, &fingerprinter, r, config));
    let outro_template = outro.and_then(|r| build_one(tracks, &fingerprinter, r, config));
    (intro_template, outro_template)
}

fn build_one(
    tracks: &[AudioTrack],
    fingerprinter: &Fingerprinter,
    range: TimeRange,
    config: &DetectionConfig,
) -> Option<Template> {
    let mut prints = Vec::new();
    for track in tracks {
        let segment = track.slice_secs(range.start, range.end);
        let secs = segment.len() as f64 / track.sample_rate as f64;
        if secs < config.min_template_secs {
            debug!(
                source = %track.source.display(),
                secs,
                "Skipping template contribution shorter than minimum"
            );
            continue;
        }
        if let Ok(print) = fingerprinter.compute(segment) {
            prints.push(print);
        }
    }

    if prints.is_empty() {
        return None;
    }
    debug!(
        contributions = prints.len(),
        start = range.start,
        end = range.end,
        "Averaging template"
    );
    Some(average_padded(&prints))
}

/// Zero-pad all matrices to the widest frame count, then average.
fn average_padded(prints: &[Array2<f32>]) -> Array2<f32> {
    let rows = prints[0].nrows();
    let width = prints.iter().map(Array2::ncols).max().unwrap_or(0);

    let mut sum = Array2::<f32>::zeros((rows, width));
    for print in prints {
        sum.slice_mut(ndarray::s![.., ..print.ncols()])
            .zip_mut_with(print, |acc, v| *acc += v);
    }
    sum.mapv_into(|v| v / prints.len() as f32)
}
