//! Analysis-audio extraction and loading.
//!
//! Detection works on low-rate mono audio decoded by FFmpeg to raw
//! `f32le`. The decoded files live under the run's `analysis_audio/`
//! directory so cleanup can remove them all at once.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{verify_output, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Decoded mono audio for one episode.
///
/// Ephemeral: owned by the batch run and deleted with the run's residuals.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    /// Video file this audio came from.
    pub source: PathBuf,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Mono samples.
    pub samples: Vec<f32>,
}

impl AudioTrack {
    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples within `[start, end)` seconds, clamped to the track.
    pub fn slice_secs(&self, start: f64, end: f64) -> &[f32] {
        let start_idx = ((start.max(0.0) * self.sample_rate as f64) as usize).min(self.samples.len());
        let end_idx = ((end.max(0.0) * self.sample_rate as f64) as usize)
            .clamp(start_idx, self.samples.len());
        &self.samples[start_idx..end_idx]
    }
}

/// Extract a video's audio to raw mono `f32le` at the given rate.
async fn extract_analysis_audio(
    input: &Path,
    output: &Path,
    sample_rate: u32,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    debug!(
        input = %input.display(),
        output = %output.display(),
        sample_rate,
        "Extracting analysis audio"
    );

    let cmd = FfmpegCommand::new(input, output).output_args([
        "-vn",
        "-ar",
        &sample_rate.to_string(),
        "-ac",
        "1",
        "-f",
        "f32le",
    ]);

    runner.run(&cmd).await?;
    verify_output(output).await
}

/// Load raw `f32le` samples from a file.
pub async fn load_audio_track(
    path: impl AsRef<Path>,
    source: impl Into<PathBuf>,
    sample_rate: u32,
) -> MediaResult<AudioTrack> {
    let bytes = tokio::fs::read(path.as_ref()).await?;

    // 4 bytes per sample, little-endian
    let samples: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(AudioTrack {
        source: source.into(),
        sample_rate,
        samples,
    })
}

/// Decode a video's analysis audio into `audio_dir` and load it.
pub async fn decode_analysis_audio(
    video: &Path,
    audio_dir: &Path,
    sample_rate: u32,
    runner: &FfmpegRunner,
) -> MediaResult<AudioTrack> {
    tokio::fs::create_dir_all(audio_dir).await?;

    let stem = video
        .file_stem()
        .ok_or_else(|| MediaError::InvalidVideo(format!("no file name: {}", video.display())))?;
    let raw_path = audio_dir.join(stem).with_extension("f32");

    extract_analysis_audio(video, &raw_path, sample_rate, runner).await?;
    let track = load_audio_track(&raw_path, video, sample_rate).await?;

    debug!(
        source = %video.display(),
        duration_secs = track.duration_secs(),
        "Loaded analysis audio"
    );

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(samples: Vec<f32>, sample_rate: u32) -> AudioTrack {
        AudioTrack {
            source: PathBuf::from("ep.mkv"),
            sample_rate,
            samples,
        }
    }

    #[tokio::test]
    async fn test_load_samples_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.f32");

        let written: Vec<f32> = vec![0.0, 0.5, 1.0, -1.0];
        let bytes: Vec<u8> = written.iter().flat_map(|f| f.to_le_bytes()).collect();
        tokio::fs::write(&path, &bytes).await.unwrap();

        let loaded = load_audio_track(&path, "ep.mkv", 16_000).await.unwrap();
        assert_eq!(loaded.samples.len(), 4);
        assert!((loaded.samples[1] - 0.5).abs() < 1e-6);
        assert!((loaded.samples[3] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_duration() {
        let t = track(vec![0.0; 32_000], 16_000);
        assert!((t.duration_secs() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_slice_clamps_to_track() {
        let t = track((0..16_000).map(|i| i as f32).collect(), 16_000);

        assert_eq!(t.slice_secs(0.0, 0.5).len(), 8_000);
        // Past-the-end slices clamp instead of panicking
        assert_eq!(t.slice_secs(0.5, 10.0).len(), 8_000);
        assert!(t.slice_secs(2.0, 3.0).is_empty());
    }
}
