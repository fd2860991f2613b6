//! Batch orchestration: probe → detect → align → trim → merge → cleanup.
//!
//! Episodes are processed strictly in input order. The merge is the only
//! stage with batch-wide side effects and runs after all trimming. Source
//! files are never modified; every transformation writes a new path, and
//! cleanup touches only generated artifacts until the final output has
//! been verified.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::debug;

use opskip_media::{decode_analysis_audio, AudioTrack, FfmpegRunner, MediaError, MediaProbe};
use opskip_models::{
    format_seconds, DetectionPreview, Episode, EngineOptions, HwCapabilities, TimeRange,
};

use crate::align::align_template;
use crate::diag::DiagnosticsSink;
use crate::error::{check_cancel, EngineError, EngineResult};
use crate::merge::{merge_episodes, select_encoder};
use crate::scanner::scan_shared_ranges;
use crate::template::build_templates;
use crate::trim::{apply_plan, plan_trim, REMOVED_DIR, TRIMMED_DIR};

/// Timeout for analysis-audio extraction per episode.
const AUDIO_TIMEOUT_SECS: u64 = 300;

/// Work-dir subdirectory for decoded analysis audio.
const AUDIO_DIR: &str = "analysis_audio";

/// One batch run. Holds no state beyond its options; construct per batch.
pub struct Engine {
    options: EngineOptions,
    hw: HwCapabilities,
}

/// Result of a completed batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// The merged output file.
    pub output: PathBuf,
    /// Per-episode detection records, when trimming ran.
    pub previews: Vec<DetectionPreview>,
    /// How many episodes actually got a trimmed copy.
    pub trimmed_count: usize,
    /// Exported removed-range clips. Gone again if `cleanup_residuals`
    /// was set.
    pub removed_clips: Vec<PathBuf>,
}

/// Shared ranges after overrides and detection.
#[derive(Debug, Clone, Copy, Default)]
struct SharedRanges {
    intro: Option<TimeRange>,
    intro_confidence: f64,
    outro: Option<TimeRange>,
    outro_confidence: f64,
}

/// Ranges assigned to one episode, shared or aligned.
#[derive(Debug, Clone, Copy)]
struct EpisodeRanges {
    intro: Option<TimeRange>,
    intro_confidence: f64,
    outro: Option<TimeRange>,
    outro_confidence: f64,
}

impl EpisodeRanges {
    fn from_shared(shared: SharedRanges) -> Self {
        Self {
            intro: shared.intro,
            intro_confidence: shared.intro_confidence,
            outro: shared.outro,
            outro_confidence: shared.outro_confidence,
        }
    }

    fn preview(&self, episode: &Episode) -> DetectionPreview {
        DetectionPreview {
            file: episode.display_name(),
            intro: self.intro,
            intro_confidence: self.intro_confidence,
            outro: self.outro,
            outro_confidence: self.outro_confidence,
        }
    }
}

impl Engine {
    /// Create an engine for one batch.
    pub fn new(options: EngineOptions, hw: HwCapabilities) -> Self {
        Self { options, hw }
    }

    /// Process the episodes and merge them into `work_dir/output_name`.
    ///
    /// Aborts on the first fatal stage error; a failing episode is never
    /// silently dropped from the merge, since a merge with missing or
    /// misordered episodes is worse than no merge.
    pub async fn run(
        &self,
        episode_paths: &[PathBuf],
        work_dir: &Path,
        output_name: &str,
        probe: &dyn MediaProbe,
        sink: &dyn DiagnosticsSink,
        cancel: Option<watch::Receiver<bool>>,
    ) -> EngineResult<BatchReport> {
        if episode_paths.is_empty() {
            return Err(EngineError::NoEpisodes);
        }
        let cancel = cancel.as_ref();
        check_cancel(cancel)?;

        sink.info(&format!(
            "Found {} video files to merge",
            episode_paths.len()
        ));

        let mut episodes = self.probe_episodes(episode_paths, probe, cancel).await?;
        let shared = self
            .resolve_shared_ranges(&episodes, work_dir, sink, cancel)
            .await?;

        let mut previews = Vec::new();
        let mut trimmed_count = 0usize;
        let mut removed_clips = Vec::new();

        if shared.intro.is_some() || shared.outro.is_some() {
            sink.info("Trimming intro/outro segments before merge...");

            let assignments = if self.options.per_episode_align {
                self.align_episodes(
                    &episodes,
                    shared,
                    work_dir,
                    Some(self.options.detection.per_episode_threshold),
                    sink,
                    cancel,
                )
                .await?
            } else {
                episodes
                    .iter()
                    .map(|_| EpisodeRanges::from_shared(shared))
                    .collect()
            };

            for (episode, ranges) in episodes.iter_mut().zip(assignments) {
                check_cancel(cancel)?;
                previews.push(ranges.preview(episode));

                let plan = plan_trim(episode.duration, ranges.intro, ranges.outro);
                let outcome = apply_plan(
                    &episode.path,
                    episode.duration,
                    &plan,
                    work_dir,
                    self.options.export_removed,
                    cancel,
                    sink,
                )
                .await?;
                if outcome.trimmed {
                    trimmed_count += 1;
                    sink.info(&format!(
                        "Trimmed {} ({} removed)",
                        episode.display_name(),
                        format_seconds(plan.removed_duration())
                    ));
                }
                episode.trimmed_path = Some(outcome.path);
                removed_clips.extend(outcome.removed_clips);
            }
        }

        check_cancel(cancel)?;
        let output_path = work_dir.join(output_name);
        let selection = select_encoder(&self.options.preset, self.options.quality, &self.hw);
        let inputs: Vec<PathBuf> = episodes.iter().map(|e| e.merge_input().clone()).collect();
        merge_episodes(&inputs, &output_path, &selection, work_dir, cancel, sink).await?;

        // The merge verified the output; generated artifacts (and, if
        // requested, the sources) may go now.
        if self.options.cleanup_residuals {
            self.cleanup_residuals(work_dir, sink).await;
        }
        if self.options.only_keep_outputs {
            self.delete_sources(&episodes, &output_path, sink).await;
        }

        sink.success(&format!(
            "Merged {} episodes into {}",
            episodes.len(),
            output_path.display()
        ));
        Ok(BatchReport {
            output: output_path,
            previews,
            trimmed_count,
            removed_clips,
        })
    }

    /// Per-episode aligned ranges and confidences for display, without
    /// trimming or merging anything.
    pub async fn preview(
        &self,
        episode_paths: &[PathBuf],
        work_dir: &Path,
        probe: &dyn MediaProbe,
        sink: &dyn DiagnosticsSink,
        cancel: Option<watch::Receiver<bool>>,
    ) -> EngineResult<Vec<DetectionPreview>> {
        if episode_paths.is_empty() {
            return Err(EngineError::NoEpisodes);
        }
        let cancel = cancel.as_ref();
        check_cancel(cancel)?;

        let episodes = self.probe_episodes(episode_paths, probe, cancel).await?;
        let shared = self
            .resolve_shared_ranges(&episodes, work_dir, sink, cancel)
            .await?;

        // Previews show the raw alignment, so no acceptance threshold.
        let assignments = self
            .align_episodes(&episodes, shared, work_dir, None, sink, cancel)
            .await?;

        Ok(episodes
            .iter()
            .zip(assignments)
            .map(|(episode, ranges)| ranges.preview(episode))
            .collect())
    }

    async fn probe_episodes(
        &self,
        paths: &[PathBuf],
        probe: &dyn MediaProbe,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> EngineResult<Vec<Episode>> {
        let mut episodes = Vec::with_capacity(paths.len());
        for path in paths {
            check_cancel(cancel)?;
            let info = probe
                .probe(path)
                .await
                .map_err(|e| EngineError::probe(path, e.to_string()))?;
            debug!(
                path = %path.display(),
                duration = info.duration,
                codec = %info.codec,
                "Probed episode"
            );
            episodes.push(Episode::new(path.clone(), info.duration));
        }
        Ok(episodes)
    }

    /// Manual overrides win; anything still missing is searched for by
    /// the cross-episode scan. A scan that finds nothing is not an error.
    async fn resolve_shared_ranges(
        &self,
        episodes: &[Episode],
        work_dir: &Path,
        sink: &dyn DiagnosticsSink,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> EngineResult<SharedRanges> {
        let options = &self.options;
        let mut shared = SharedRanges {
            intro: options.intro_override,
            intro_confidence: if options.intro_override.is_some() { 1.0 } else { 0.0 },
            outro: options.outro_override,
            outro_confidence: if options.outro_override.is_some() { 1.0 } else { 0.0 },
        };
        if shared.intro.is_some() && shared.outro.is_some() {
            return Ok(shared);
        }

        let sample_count = episodes.len().min(options.detection.max_tracks);
        let tracks = self
            .decode_tracks(&episodes[..sample_count], work_dir, sink, cancel)
            .await?;
        if tracks.len() < 2 {
            sink.warning("Need at least 2 videos for pattern detection");
            return Ok(shared);
        }

        check_cancel(cancel)?;
        sink.info(&format!(
            "Analyzing {} audio files for patterns...",
            tracks.len()
        ));
        let outcome = scan_shared_ranges(&tracks, &options.detection);

        if shared.intro.is_none() {
            match outcome.intro {
                Some(det) => {
                    sink.success(&format!(
                        "Detected intro: {:.1}s-{:.1}s (confidence: {:.2})",
                        det.range.start, det.range.end, det.confidence
                    ));
                    shared.intro = Some(det.range);
                    shared.intro_confidence = det.confidence;
                }
                None => sink.info("No intro pattern above threshold"),
            }
        }
        if shared.outro.is_none() {
            match outcome.outro {
                Some(det) => {
                    sink.success(&format!(
                        "Detected outro: {:.1}s-{:.1}s (confidence: {:.2})",
                        det.range.start, det.range.end, det.confidence
                    ));
                    shared.outro = Some(det.range);
                    shared.outro_confidence = det.confidence;
                }
                None => sink.info("No outro pattern above threshold"),
            }
        }
        Ok(shared)
    }

    /// Decode analysis audio for the given episodes. Episodes whose audio
    /// cannot be decoded are skipped with a warning; cancellation is not.
    async fn decode_tracks(
        &self,
        episodes: &[Episode],
        work_dir: &Path,
        sink: &dyn DiagnosticsSink,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> EngineResult<Vec<AudioTrack>> {
        let audio_dir = work_dir.join(AUDIO_DIR);
        let mut runner = FfmpegRunner::new().with_timeout(AUDIO_TIMEOUT_SECS);
        if let Some(rx) = cancel {
            runner = runner.with_cancel(rx.clone());
        }

        let mut tracks = Vec::new();
        for episode in episodes {
            check_cancel(cancel)?;
            match decode_analysis_audio(
                &episode.path,
                &audio_dir,
                self.options.detection.sample_rate,
                &runner,
            )
            .await
            {
                Ok(track) => tracks.push(track),
                Err(MediaError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => sink.warning(&format!(
                    "Skipping {} for analysis: {}",
                    episode.display_name(),
                    e
                )),
            }
        }
        Ok(tracks)
    }

    /// Build templates from the shared ranges and align them to each
    /// episode. `threshold` of `None` accepts every alignment (previews);
    /// otherwise an alignment below it falls back to the shared range.
    async fn align_episodes(
        &self,
        episodes: &[Episode],
        shared: SharedRanges,
        work_dir: &Path,
        threshold: Option<f64>,
        sink: &dyn DiagnosticsSink,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> EngineResult<Vec<EpisodeRanges>> {
        sink.info("Per-episode alignment: building templates...");

        let audio_dir = work_dir.join(AUDIO_DIR);
        let mut runner = FfmpegRunner::new().with_timeout(AUDIO_TIMEOUT_SECS);
        if let Some(rx) = cancel {
            runner = runner.with_cancel(rx.clone());
        }

        // Every episode gets aligned, so audio is decoded for all of
        // them, not just the scan sample. Failures degrade that episode
        // to the shared ranges.
        let mut tracks: Vec<AudioTrack> = Vec::new();
        let mut track_index: Vec<Option<usize>> = Vec::with_capacity(episodes.len());
        for episode in episodes {
            check_cancel(cancel)?;
            match decode_analysis_audio(
                &episode.path,
                &audio_dir,
                self.options.detection.sample_rate,
                &runner,
            )
            .await
            {
                Ok(track) => {
                    track_index.push(Some(tracks.len()));
                    tracks.push(track);
                }
                Err(MediaError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    sink.warning(&format!(
                        "No analysis audio for {}, using shared ranges: {}",
                        episode.display_name(),
                        e
                    ));
                    track_index.push(None);
                }
            }
        }

        let detection = &self.options.detection;
        let (intro_template, outro_template) =
            build_templates(&tracks, shared.intro, shared.outro, detection);

        let mut assignments = Vec::with_capacity(episodes.len());
        for (episode, index) in episodes.iter().zip(&track_index) {
            check_cancel(cancel)?;
            let mut ranges = EpisodeRanges::from_shared(shared);

            if let Some(index) = index {
                let track = &tracks[*index];

                let intro_det = align_template(
                    track,
                    intro_template.as_ref(),
                    0.0,
                    detection.intro_search_secs.min(episode.duration),
                    detection.align_hop_secs,
                );
                if let Some(det) = intro_det {
                    if threshold.map_or(true, |t| det.confidence > t) {
                        sink.info(&format!(
                            "Aligned intro for {}: {:.1}-{:.1}",
                            episode.display_name(),
                            det.range.start,
                            det.range.end
                        ));
                        ranges.intro = Some(det.range);
                        ranges.intro_confidence = det.confidence;
                    }
                }

                let outro_det = align_template(
                    track,
                    outro_template.as_ref(),
                    (episode.duration - detection.outro_search_secs).max(0.0),
                    episode.duration,
                    detection.align_hop_secs,
                );
                if let Some(det) = outro_det {
                    if threshold.map_or(true, |t| det.confidence > t) {
                        sink.info(&format!(
                            "Aligned outro for {}: {:.1}-{:.1}",
                            episode.display_name(),
                            det.range.start,
                            det.range.end
                        ));
                        ranges.outro = Some(det.range);
                        ranges.outro_confidence = det.confidence;
                    }
                }
            }
            assignments.push(ranges);
        }
        Ok(assignments)
    }

    /// Delete generated intermediates. Never touches source files.
    async fn cleanup_residuals(&self, work_dir: &Path, sink: &dyn DiagnosticsSink) {
        for name in [AUDIO_DIR, TRIMMED_DIR, REMOVED_DIR] {
            let dir = work_dir.join(name);
            if dir.is_dir() {
                debug!(dir = %dir.display(), "Removing temporary directory");
                if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                    sink.warning(&format!("Cleanup warning: {}", e));
                }
            }
        }
    }

    /// Delete the source episodes, keeping only the produced output.
    /// Runs strictly after the output has been verified.
    async fn delete_sources(
        &self,
        episodes: &[Episode],
        output: &Path,
        sink: &dyn DiagnosticsSink,
    ) {
        for episode in episodes {
            if episode.path.as_path() == output {
                continue;
            }
            sink.info(&format!("Removing source video: {}", episode.display_name()));
            if let Err(e) = tokio::fs::remove_file(&episode.path).await {
                sink.warning(&format!(
                    "Retention warning for {}: {}",
                    episode.display_name(),
                    e
                ));
            }
        }
    }
}
