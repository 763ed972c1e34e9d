use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::MediaTool;
use crate::config::Config;
use crate::transcription::render::save_to_file;
use crate::transcription::{ChunkSettings, ChunkedTranscriber, TranscriptionBackend};
use crate::{Result, TranscriberError};

/// Where the transcript for `input` is written: same path, `.txt` extension
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension("txt")
}

/// Video in, transcript file out
pub struct TranscriptionPipeline {
    media: Arc<dyn MediaTool>,
    transcriber: ChunkedTranscriber,
    audio_format: String,
}

impl TranscriptionPipeline {
    pub fn new(
        media: Arc<dyn MediaTool>,
        backend: Arc<dyn TranscriptionBackend>,
        config: &Config,
    ) -> Self {
        let transcriber = ChunkedTranscriber::new(
            media.clone(),
            backend,
            ChunkSettings::from_config(&config.chunking),
        );

        Self {
            media,
            transcriber,
            audio_format: config.audio.format.clone(),
        }
    }

    /// Convert, transcribe, render and save. Nothing is written unless every
    /// step succeeds.
    pub async fn run(&self, video: &Path) -> Result<PathBuf> {
        if !video.is_file() {
            return Err(TranscriberError::Input(format!(
                "video file does not exist: {}",
                video.display()
            )));
        }

        info!("Converting video to {}...", self.audio_format.to_uppercase());
        let audio = self.temp_audio_path()?;
        self.media.extract_audio(video, &audio).await?;

        let transcript = self.transcriber.transcribe(&audio).await?;
        if transcript.is_empty() {
            warn!("Service returned an empty transcript for {}", video.display());
        }

        let output = output_path_for(video);
        save_to_file(&transcript, &output).await?;

        if let Err(e) = audio.close() {
            warn!("Failed to remove temporary audio: {}", e);
        }

        Ok(output)
    }

    fn temp_audio_path(&self) -> Result<tempfile::TempPath> {
        let suffix = format!(".{}", self.audio_format);
        let dir = self
            .transcriber
            .settings()
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let file = tempfile::Builder::new()
            .prefix("transcribe-")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        Ok(file.into_temp_path())
    }
}
