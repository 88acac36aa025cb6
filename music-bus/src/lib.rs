//! Variant ladder and transcode orchestration for uploaded audio.

pub mod encoder;
pub mod error;
pub mod orchestrator;
pub mod variant;

pub use error::TranscodeError;

/// Checks that the encoder binary can be launched. Call once at startup.
pub async fn init(ffmpeg_path: &str) -> anyhow::Result<String> {
    encoder::FfmpegEncoder::new(ffmpeg_path).version().await
}
