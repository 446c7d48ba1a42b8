/// Still frames sampled from clips
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes still frames of a clip into a directory
#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Extract up to `count` frames from `video` into `out_dir`. Returns the
    /// paths of the frames actually written.
    async fn sample(&self, video: &Path, count: usize, out_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// `count` timestamps spread evenly from the start to just before the end
pub fn evenly_spaced(duration: f64, count: usize) -> Vec<f64> {
    if count == 0 || !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    // the very last instant often decodes to nothing
    let last = (duration - 0.1).max(0.0);
    if count == 1 {
        return vec![last / 2.0];
    }
    (0..count)
        .map(|i| last * i as f64 / (count - 1) as f64)
        .collect()
}

/// Uses the `ffprobe` and `ffmpeg` command line tools
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSampler;

impl FfmpegFrameSampler {
    pub fn new() -> Self {
        Self
    }

    async fn duration(&self, video: &Path) -> Result<f64> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v", "error",
                "-show_entries", "format=duration",
                "-of", "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(video)
            .output()
            .await?;

        if !output.status.success() {
            return Err(anyhow!("ffprobe failed for {}", video.display()));
        }

        let text = String::from_utf8(output.stdout)?;
        text.trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("ffprobe reported no duration for {}", video.display()))
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample(&self, video: &Path, count: usize, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let duration = self.duration(video).await?;
        let timestamps = evenly_spaced(duration, count);
        if timestamps.is_empty() {
            warn!("⚠️  {} has no frames to sample", video.display());
            return Ok(Vec::new());
        }

        let mut frames = Vec::with_capacity(timestamps.len());
        for (index, timestamp) in timestamps.iter().enumerate() {
            let frame_path = out_dir.join(format!("frame_{:03}.jpg", index));
            let timestamp_str = format!("{:.2}", timestamp);

            let status = tokio::process::Command::new("ffmpeg")
                .args(["-v", "error", "-ss", &timestamp_str, "-i"])
                .arg(video)
                .args(["-frames:v", "1", "-q:v", "2", "-y"])
                .arg(&frame_path)
                .status()
                .await?;

            if status.success() && frame_path.exists() {
                frames.push(frame_path);
            } else {
                debug!("No frame at {}s in {}", timestamp_str, video.display());
            }
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evenly_spaced() {
        let stamps = evenly_spaced(10.1, 3);
        assert_eq!(stamps.len(), 3);
        assert!((stamps[0] - 0.0).abs() < 1e-9);
        assert!((stamps[1] - 5.0).abs() < 1e-9);
        assert!((stamps[2] - 10.0).abs() < 1e-9);

        assert_eq!(evenly_spaced(10.0, 0), Vec::<f64>::new());
        assert_eq!(evenly_spaced(0.0, 8), Vec::<f64>::new());
        assert_eq!(evenly_spaced(f64::NAN, 8), Vec::<f64>::new());
        assert_eq!(evenly_spaced(4.1, 1).len(), 1);
    }
}
