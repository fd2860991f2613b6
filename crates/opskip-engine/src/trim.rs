//! Segment trimming: keep/removed planning and lossless-first cutting.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, warn};

use opskip_media::{
    concat_list_content, verify_output, FfmpegCommand, FfmpegRunner, MediaError, MediaResult,
};
use opskip_models::encoding::SEGMENT_FALLBACK_CRF;
use opskip_models::{TimeRange, TrimPlan};

use crate::diag::DiagnosticsSink;
use crate::error::{check_cancel, EngineError, EngineResult};

/// Heads/tails shorter than this are dropped rather than kept.
const MIN_SEGMENT_LEAD_SECS: f64 = 0.25;

/// Timeout for each extraction or concatenation invocation.
const SEGMENT_TIMEOUT_SECS: u64 = 1800;

/// Work-dir subdirectory for segment parts and trimmed copies.
pub(crate) const TRIMMED_DIR: &str = "trimmed";

/// Work-dir subdirectory for removed-range exports.
pub(crate) const REMOVED_DIR: &str = "removed";

/// Compute the keep/removed partition for one episode.
///
/// Ranges are clamped into `[0, duration]` first. Whether the resulting
/// plan is worth applying at all is carried by [`TrimPlan::is_noop`].
pub fn plan_trim(
    duration: f64,
    intro: Option<TimeRange>,
    outro: Option<TimeRange>,
) -> TrimPlan {
    let intro = intro.map(|r| r.clamped(duration));
    let outro = outro.map(|r| r.clamped(duration));

    let mut keep = Vec::new();
    let mut removed = Vec::new();

    // Head before the intro, unless it is too short to matter.
    if let Some(i) = intro {
        if i.start > MIN_SEGMENT_LEAD_SECS {
            keep.push(TimeRange { start: 0.0, end: i.start });
        }
        if !i.is_empty() {
            removed.push(i);
        }
    }

    // Middle between intro end and outro start (or end of file).
    let middle_start = intro.map(|i| i.end).unwrap_or(0.0);
    match outro {
        Some(o) => {
            if o.start > middle_start + MIN_SEGMENT_LEAD_SECS {
                keep.push(TimeRange {
                    start: middle_start,
                    end: o.start,
                });
            }
        }
        None => {
            if duration > middle_start + MIN_SEGMENT_LEAD_SECS {
                keep.push(TimeRange {
                    start: middle_start,
                    end: duration,
                });
            }
        }
    }

    // Tail after the outro.
    if let Some(o) = outro {
        if duration > o.end + MIN_SEGMENT_LEAD_SECS {
            keep.push(TimeRange {
                start: o.end,
                end: duration,
            });
        }
        if !o.is_empty() {
            removed.push(o);
        }
    }

    TrimPlan { keep, removed }
}

/// Result of applying a trim plan.
#[derive(Debug, Clone)]
pub struct TrimOutcome {
    /// The file to use downstream: the trimmed copy, or the original for
    /// a no-op plan.
    pub path: PathBuf,
    /// Exported removed-range clips, when requested.
    pub removed_clips: Vec<PathBuf>,
    /// Whether a trimmed copy was actually produced.
    pub trimmed: bool,
}

/// Apply a trim plan to one episode.
///
/// Each keep segment is extracted with stream copy first and re-encoded
/// only if that fails; the parts are then joined with the concat demuxer,
/// again with a re-encode fallback. The source file is never modified.
/// Extraction/concat failure (after fallback) aborts the batch; exporting
/// removed ranges is best-effort.
pub async fn apply_plan(
    input: &Path,
    duration: f64,
    plan: &TrimPlan,
    work_dir: &Path,
    export_removed: bool,
    cancel: Option<&watch::Receiver<bool>>,
    sink: &dyn DiagnosticsSink,
) -> EngineResult<TrimOutcome> {
    if plan.is_noop(duration) {
        debug!(input = %input.display(), "Trim plan is a no-op, keeping original");
        return Ok(TrimOutcome {
            path: input.to_path_buf(),
            removed_clips: Vec::new(),
            trimmed: false,
        });
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "episode".to_string());
    let trimmed_dir = work_dir.join(TRIMMED_DIR);
    tokio::fs::create_dir_all(&trimmed_dir).await?;

    let mut runner = FfmpegRunner::new().with_timeout(SEGMENT_TIMEOUT_SECS);
    if let Some(rx) = cancel {
        runner = runner.with_cancel(rx.clone());
    }

    // Extract each keep segment.
    let mut parts = Vec::new();
    for (idx, segment) in plan.keep.iter().enumerate() {
        check_cancel(cancel)?;

        let part = trimmed_dir.join(format!("{}.part{}.mp4", stem, idx + 1));
        extract_segment(input, &part, segment, &runner)
            .await
            .map_err(|e| match e {
                MediaError::Cancelled => EngineError::Cancelled,
                other => EngineError::extraction(input, format!("segment {}: {}", idx + 1, other)),
            })?;
        parts.push(part);
    }

    // Join the parts.
    check_cancel(cancel)?;
    let list_path = trimmed_dir.join(format!("{}_parts.txt", stem));
    tokio::fs::write(&list_path, concat_list_content(&parts)).await?;

    let trimmed_path = trimmed_dir.join(format!("{}.trimmed.mp4", stem));
    concat_parts(&list_path, &trimmed_path, &runner)
        .await
        .map_err(|e| match e {
            MediaError::Cancelled => EngineError::Cancelled,
            other => EngineError::concat(input, other.to_string()),
        })?;

    // Removed-range exports are for audit only; failures are logged.
    let mut removed_clips = Vec::new();
    if export_removed && !plan.removed.is_empty() {
        let removed_dir = work_dir.join(REMOVED_DIR);
        tokio::fs::create_dir_all(&removed_dir).await?;
        for (idx, segment) in plan.removed.iter().enumerate() {
            check_cancel(cancel)?;

            let clip = removed_dir.join(format!("{}.removed{}.mp4", stem, idx + 1));
            match extract_segment(input, &clip, segment, &runner).await {
                Ok(()) => removed_clips.push(clip),
                Err(MediaError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    sink.warning(&format!(
                        "Skipping removed-range export {} of {}: {}",
                        idx + 1,
                        stem,
                        e
                    ));
                }
            }
        }
    }

    Ok(TrimOutcome {
        path: trimmed_path,
        removed_clips,
        trimmed: true,
    })
}

/// Extract `[segment.start, segment.end)` of `input` into `output`.
///
/// Stream copy where possible; accuracy depends on keyframes. Falls back
/// to a fast re-encode when the copy fails or produces an empty file.
async fn extract_segment(
    input: &Path,
    output: &Path,
    segment: &TimeRange,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let copy = FfmpegCommand::new(input, output)
        .seek(segment.start)
        .until(segment.end)
        .codec_copy();

    match run_and_verify(runner, &copy).await {
        Ok(()) => return Ok(()),
        Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
        Err(e) => {
            warn!(
                output = %output.display(),
                error = %e,
                "Stream-copy extraction failed, re-encoding segment"
            );
        }
    }

    let reencode = FfmpegCommand::new(input, output)
        .seek(segment.start)
        .until(segment.end)
        .video_codec("libx264")
        .preset("veryfast")
        .crf(SEGMENT_FALLBACK_CRF)
        .audio_codec("copy");
    run_and_verify(runner, &reencode).await
}

/// Concatenate the listed parts, stream copy first, re-encode fallback.
async fn concat_parts(
    list_path: &Path,
    output: &Path,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let copy = FfmpegCommand::new(list_path, output)
        .concat_demuxer()
        .codec_copy();

    match run_and_verify(runner, &copy).await {
        Ok(()) => return Ok(()),
        Err(MediaError::Cancelled) => return Err(MediaError::Cancelled),
        Err(e) => {
            warn!(
                output = %output.display(),
                error = %e,
                "Stream-copy concat failed, re-encoding"
            );
        }
    }

    let reencode = FfmpegCommand::new(list_path, output)
        .concat_demuxer()
        .video_codec("libx264")
        .preset("veryfast")
        .crf(SEGMENT_FALLBACK_CRF)
        .audio_codec("copy");
    run_and_verify(runner, &reencode).await
}

async fn run_and_verify(runner: &FfmpegRunner, cmd: &FfmpegCommand) -> MediaResult<()> {
    runner.run(cmd).await?;
    verify_output(cmd.output_path()).await
}
