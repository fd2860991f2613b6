//! FFmpeg CLI wrapper for the opskip engine.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A process runner with timeout, cancellation, and stderr capture
//! - FFprobe-backed media probing behind an injectable trait
//! - Analysis-audio extraction and loading

pub mod audio;
pub mod command;
pub mod error;
pub mod probe;

pub use audio::{decode_analysis_audio, load_audio_track, AudioTrack};
pub use command::{
    check_ffmpeg, check_ffprobe, concat_list_content, verify_output, FfmpegCommand, FfmpegRunner,
};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_video, FfprobeProbe, MediaProbe, VideoInfo};
