use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{audio_mime_type, read_audio, TranscriptionBackend};
use super::transcript::{TimedFragment, Transcript};
use crate::config::OpenAiConfig;
use crate::{Result, TranscriberError};

/// Synchronous diarizing transcription: one multipart request, result in the response
pub struct OpenAiDiarizeBackend {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    response_format: String,
    chunking_strategy: String,
}

#[derive(Debug, Deserialize)]
struct DiarizedResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<DiarizedSegment>,
}

#[derive(Debug, Deserialize)]
struct DiarizedSegment {
    #[serde(default)]
    speaker: Option<String>,
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

impl OpenAiDiarizeBackend {
    pub fn new(api_key: String, config: &OpenAiConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscriberError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            response_format: config.response_format.clone(),
            chunking_strategy: config.chunking_strategy.clone(),
        })
    }

    fn build_form(&self, audio: &Path, bytes: Vec<u8>) -> Result<multipart::Form> {
        let file_name = audio
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let file_part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(audio_mime_type(audio))
            .map_err(|e| TranscriberError::Upload(format!("mime: {}", e)))?;

        Ok(multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", self.response_format.clone())
            .text("chunking_strategy", self.chunking_strategy.clone()))
    }
}

#[async_trait]
impl TranscriptionBackend for OpenAiDiarizeBackend {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        let bytes = read_audio(audio).await?;
        let size = bytes.len();
        let form = self.build_form(audio, bytes)?;

        debug!(model = %self.model, bytes = size, "Sending audio to diarization endpoint");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriberError::Upload(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriberError::Upload(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(TranscriberError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let transcript = parse_diarized_response(&body)?;
        info!(
            segments = transcript.fragments().len(),
            chars = transcript.text().len(),
            "Diarized transcription completed"
        );
        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Decode a `diarized_json` response body
pub fn parse_diarized_response(body: &str) -> Result<Transcript> {
    let response: DiarizedResponse =
        serde_json::from_str(body).map_err(|e| TranscriberError::Parse(e.to_string()))?;

    let fragments = response
        .segments
        .into_iter()
        .map(|segment| {
            TimedFragment::new(
                segment.speaker.as_deref(),
                segment.start,
                segment.end,
                segment.text,
            )
        })
        .collect();

    Ok(Transcript::new(response.text, fragments))
}
