use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::assemblyai::{AssemblyAiBackend, PollPolicy};
use super::openai::OpenAiDiarizeBackend;
use super::transcript::Transcript;
use crate::config::{BackendKind, Config};
use crate::Result;

/// A remote service that turns one audio file into a diarized transcript
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript>;

    fn name(&self) -> &'static str;
}

/// Create the backend selected by configuration
pub fn create_backend(config: &Config) -> Result<Arc<dyn TranscriptionBackend>> {
    let transcription = &config.transcription;
    let api_key = transcription.resolve_api_key()?;
    let timeout = transcription.request_timeout();

    match transcription.backend {
        BackendKind::OpenAi => Ok(Arc::new(OpenAiDiarizeBackend::new(
            api_key,
            &transcription.openai,
            timeout,
        )?)),
        BackendKind::AssemblyAi => Ok(Arc::new(AssemblyAiBackend::new(
            api_key,
            &transcription.assemblyai,
            PollPolicy::from_config(&config.polling),
            timeout,
        )?)),
    }
}

/// MIME type sent along with an uploaded audio file
pub(crate) fn audio_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub(crate) async fn read_audio(audio: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(audio).await.map_err(|e| {
        crate::TranscriberError::Upload(format!(
            "failed to open audio file {}: {}",
            audio.display(),
            e
        ))
    })
}
