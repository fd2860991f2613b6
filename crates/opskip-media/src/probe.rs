//! FFprobe media information.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// Probed media information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds. Always positive; probing fails otherwise.
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Video codec
    pub codec: String,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Media probing capability, injected into the engine by the caller.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probe a file. Must fail when the duration cannot be determined.
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;
}

/// The default probe, backed by the `ffprobe` CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeProbe;

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(path).await
    }
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    // Check FFprobe exists
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    parse_probe(probe, path)
}

/// Get a file's duration in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let info = probe_video(path).await?;
    Ok(info.duration)
}

fn parse_probe(probe: FfprobeOutput, path: &Path) -> MediaResult<VideoInfo> {
    // An undeterminable duration makes every downstream cut meaningless,
    // so it is an error here rather than a zero default.
    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0)
        .ok_or_else(|| {
            MediaError::InvalidVideo(format!(
                "duration undeterminable for {}",
                path.display()
            ))
        })?;

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");

    Ok(VideoInfo {
        duration,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        codec: video_stream
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_json(duration: Option<&str>) -> FfprobeOutput {
        FfprobeOutput {
            format: FfprobeFormat {
                duration: duration.map(str::to_string),
            },
            streams: vec![FfprobeStream {
                codec_type: "video".to_string(),
                codec_name: Some("h264".to_string()),
                width: Some(1920),
                height: Some(1080),
            }],
        }
    }

    #[test]
    fn test_parse_probe() {
        let info = parse_probe(probe_json(Some("1420.52")), Path::new("ep.mkv")).unwrap();
        assert!((info.duration - 1420.52).abs() < 1e-9);
        assert_eq!(info.width, 1920);
        assert_eq!(info.codec, "h264");
    }

    #[test]
    fn test_missing_duration_is_an_error() {
        assert!(matches!(
            parse_probe(probe_json(None), Path::new("ep.mkv")),
            Err(MediaError::InvalidVideo(_))
        ));
        assert!(matches!(
            parse_probe(probe_json(Some("0.0")), Path::new("ep.mkv")),
            Err(MediaError::InvalidVideo(_))
        ));
        assert!(matches!(
            parse_probe(probe_json(Some("N/A")), Path::new("ep.mkv")),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = probe_video("/nonexistent/episode.mkv").await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
