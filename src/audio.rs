use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use tracing::{debug, info};

use crate::config::AudioConfig;
use crate::{Result, TranscriberError};

/// External media prober/converter used by the pipeline and the chunker
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Total duration of a media file in seconds
    async fn probe_duration(&self, media: &Path) -> Result<f64>;

    /// Convert a whole media file into an audio-only file at `dest`
    async fn extract_audio(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Copy `[offset, offset + duration)` of `source` into `dest`
    async fn extract_range(
        &self,
        source: &Path,
        dest: &Path,
        offset_seconds: u64,
        duration_seconds: f64,
    ) -> Result<()>;
}

/// ffmpeg/ffprobe backed audio extractor
#[derive(Debug, Clone)]
pub struct AudioExtractor {
    ffmpeg: String,
    ffprobe: String,
    codec: String,
    quality: String,
    format: String,
}

impl AudioExtractor {
    pub fn new() -> Self {
        Self::from_config(&AudioConfig::default())
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            codec: config.codec.clone(),
            quality: config.quality.clone(),
            format: config.format.clone(),
        }
    }

    /// Extension of the audio files this extractor produces
    pub fn target_format(&self) -> &str {
        &self.format
    }

    async fn run_ffmpeg(&self, args: &[&str], what: &str) -> Result<()> {
        debug!("Running {} {}", self.ffmpeg, args.join(" "));

        let output = tokio::process::Command::new(&self.ffmpeg)
            .args(args)
            .output()
            .await
            .map_err(|e| TranscriberError::Conversion {
                message: format!("could not start {}", self.ffmpeg),
                stderr: e.to_string(),
            })?;

        check_status(&output, what)
    }
}

impl Default for AudioExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaTool for AudioExtractor {
    async fn probe_duration(&self, media: &Path) -> Result<f64> {
        let output = tokio::process::Command::new(&self.ffprobe)
            .args([
                "-v", "error",
                "-show_entries", "format=duration",
                "-of", "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(media)
            .output()
            .await
            .map_err(|e| TranscriberError::DurationQuery(format!("could not start {}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(TranscriberError::DurationQuery(format!(
                "ffprobe failed for {}: {}",
                media.display(),
                stderr_tail(&output.stderr)
            )));
        }

        parse_duration_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn extract_audio(&self, source: &Path, dest: &Path) -> Result<()> {
        if !source.exists() {
            return Err(TranscriberError::Input(format!(
                "video file does not exist: {}",
                source.display()
            )));
        }

        info!("Converting {} to {}...", source.display(), self.format);

        let source = path_arg(source)?;
        let dest = path_arg(dest)?;
        self.run_ffmpeg(
            &[
                "-i", source,
                "-vn", // No video stream
                "-acodec", self.codec.as_str(),
                "-q:a", self.quality.as_str(),
                "-y", // Overwrite the placeholder temp file
                dest,
            ],
            "audio conversion",
        )
        .await
    }

    async fn extract_range(
        &self,
        source: &Path,
        dest: &Path,
        offset_seconds: u64,
        duration_seconds: f64,
    ) -> Result<()> {
        let offset = offset_seconds.to_string();
        let duration = format!("{:.3}", duration_seconds);
        let source = path_arg(source)?;
        let dest = path_arg(dest)?;

        self.run_ffmpeg(
            &[
                "-i", source,
                "-ss", offset.as_str(),
                "-t", duration.as_str(),
                "-acodec", "copy", // Copy without re-encoding
                "-y",
                dest,
            ],
            "chunk extraction",
        )
        .await
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| TranscriberError::Input(format!("path is not valid UTF-8: {}", path.display())))
}

fn check_status(output: &Output, what: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    Err(TranscriberError::Conversion {
        message: format!("{} exited with {}", what, output.status),
        stderr: stderr_tail(&output.stderr),
    })
}

/// Parse ffprobe's bare `format=duration` output
pub fn parse_duration_output(stdout: &str) -> Result<f64> {
    let trimmed = stdout.trim();
    let duration: f64 = trimmed.parse().map_err(|_| {
        TranscriberError::DurationQuery(format!("unparsable duration '{}'", trimmed))
    })?;

    if !duration.is_finite() {
        return Err(TranscriberError::DurationQuery(format!(
            "duration is not a finite number: '{}'",
            trimmed
        )));
    }

    Ok(duration)
}

/// Last non-empty stderr line; ffmpeg prints the actual failure there
pub fn stderr_tail(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
        .to_string()
}
