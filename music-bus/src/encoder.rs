use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use futures::future::BoxFuture;
use tokio::process::Command;

/// Produces one bitrate variant from a source file.
pub trait Encoder: Send + Sync {
    fn encode<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
        bitrate_kbps: u32,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Runs an external ffmpeg process per job, re-encoding into an MP3 container.
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// First line of `ffmpeg -version`.
    pub async fn version(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("spawn {}: {}", self.ffmpeg_path.display(), e))?;
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "{} -version exited with {}",
                self.ffmpeg_path.display(),
                output.status
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    fn command(&self, source: &Path, dest: &Path, bitrate_kbps: u32) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"])
            .arg(source)
            .args(["-vn", "-map_metadata", "0", "-codec:a", "libmp3lame", "-b:a"])
            .arg(format!("{}k", bitrate_kbps))
            .args(["-f", "mp3"])
            .arg(dest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Encoder for FfmpegEncoder {
    fn encode<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
        bitrate_kbps: u32,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            log::debug!(
                "ffmpeg: {} -> {} @ {}k",
                source.display(),
                dest.display(),
                bitrate_kbps
            );
            let output = self
                .command(source, dest, bitrate_kbps)
                .output()
                .await
                .map_err(|e| anyhow::anyhow!("spawn {}: {}", self.ffmpeg_path.display(), e))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(anyhow::anyhow!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    stderr_tail(&stderr)
                ));
            }
            Ok(())
        })
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(3);
    lines[start..].join(" | ")
}
