use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::backend::{read_audio, TranscriptionBackend};
use super::transcript::{TimedFragment, Transcript};
use crate::config::{AssemblyAiConfig, PollingConfig};
use crate::{Result, TranscriberError};

/// Remote job state as reported by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
    /// Anything the service sends that we do not know how to wait on
    Unknown(String),
}

impl JobStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "error" => JobStatus::Error,
            other => JobStatus::Unknown(other.to_string()),
        }
    }
}

/// Snapshot of an asynchronous transcription job
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    pub id: String,
    pub status: JobStatus,
    pub text: Option<String>,
    pub result: Option<Vec<TimedFragment>>,
    pub error_message: Option<String>,
}

impl TranscriptionJob {
    fn into_transcript(self) -> Transcript {
        Transcript::new(self.text.unwrap_or_default(), self.result.unwrap_or_default())
    }
}

/// How long and how often to ask for job status.
///
/// Delays start at `initial_delay` and grow by `backoff_factor` up to
/// `max_delay`. With `timeout` set, waiting stops with
/// [`TranscriberError::Timeout`] once the next sleep would cross it.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Constant delay, no time limit
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
            timeout: None,
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
            timeout: match config.timeout_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay after the `attempt`-th pending status (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64();
        let grown = base * self.backoff_factor.max(1.0).powi(attempt.min(64) as i32);
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Serialize)]
struct TranscriptRequest<'a> {
    audio_url: &'a str,
    speaker_labels: bool,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    utterances: Option<Vec<Utterance>>,
    #[serde(default)]
    error: Option<String>,
}

/// Utterance times are milliseconds on the wire
#[derive(Debug, Deserialize)]
struct Utterance {
    #[serde(default)]
    speaker: Option<String>,
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

impl From<TranscriptResponse> for TranscriptionJob {
    fn from(response: TranscriptResponse) -> Self {
        let result = response.utterances.map(|utterances| {
            utterances
                .into_iter()
                .map(|u| {
                    TimedFragment::new(u.speaker.as_deref(), u.start / 1000.0, u.end / 1000.0, u.text)
                })
                .collect()
        });

        Self {
            id: response.id,
            status: JobStatus::parse(&response.status),
            text: response.text,
            result,
            error_message: response.error,
        }
    }
}

/// Asynchronous transcription: upload the audio, create a job, poll it
pub struct AssemblyAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    speaker_labels: bool,
    poll_policy: PollPolicy,
}

impl AssemblyAiBackend {
    pub fn new(
        api_key: String,
        config: &AssemblyAiConfig,
        poll_policy: PollPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscriberError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            speaker_labels: config.speaker_labels,
            poll_policy,
        })
    }

    /// Send raw audio bytes to the storage endpoint, returning the asset URL
    pub async fn upload(&self, audio: &Path) -> Result<String> {
        let bytes = read_audio(audio).await?;
        debug!(bytes = bytes.len(), "Uploading audio");

        let response = self
            .client
            .post(format!("{}/v2/upload", self.base_url))
            .header("authorization", &self.api_key)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| TranscriberError::Upload(format!("failed to send request: {}", e)))?;

        let body = success_body(response, TranscriberError::Upload).await?;
        let upload: UploadResponse =
            serde_json::from_str(&body).map_err(|e| TranscriberError::Parse(e.to_string()))?;
        Ok(upload.upload_url)
    }

    /// Create a transcription job for an uploaded asset, returning its id
    pub async fn submit_job(&self, upload_url: &str) -> Result<String> {
        let request = TranscriptRequest {
            audio_url: upload_url,
            speaker_labels: self.speaker_labels,
        };

        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranscriberError::Submit(format!("failed to send request: {}", e)))?;

        let body = success_body(response, TranscriberError::Submit).await?;
        let job: TranscriptResponse =
            serde_json::from_str(&body).map_err(|e| TranscriberError::Parse(e.to_string()))?;

        debug!(job_id = %job.id, status = %job.status, "Transcription job created");
        Ok(job.id)
    }

    /// Fetch the current state of a job
    pub async fn poll(&self, job_id: &str) -> Result<TranscriptionJob> {
        let response = self
            .client
            .get(format!("{}/v2/transcript/{}", self.base_url, job_id))
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| TranscriberError::Submit(format!("failed to poll job {}: {}", job_id, e)))?;

        let body = success_body(response, TranscriberError::Submit).await?;
        let job: TranscriptResponse =
            serde_json::from_str(&body).map_err(|e| TranscriberError::Parse(e.to_string()))?;
        Ok(job.into())
    }

    /// Poll until the job settles or the policy's timeout runs out
    pub async fn wait_for_completion(&self, job_id: &str) -> Result<Transcript> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let job = self.poll(job_id).await?;

            match job.status {
                JobStatus::Completed => return Ok(job.into_transcript()),
                JobStatus::Error => {
                    return Err(TranscriberError::JobFailed {
                        job_id: job_id.to_string(),
                        message: job
                            .error_message
                            .unwrap_or_else(|| "service reported an error without a message".to_string()),
                    })
                }
                JobStatus::Unknown(status) => {
                    return Err(TranscriberError::Poll {
                        job_id: job_id.to_string(),
                        status,
                    })
                }
                JobStatus::Queued | JobStatus::Processing => {}
            }

            let delay = self.poll_policy.delay_for(attempt);
            if let Some(timeout) = self.poll_policy.timeout {
                if started.elapsed() + delay > timeout {
                    return Err(TranscriberError::Timeout {
                        job_id: job_id.to_string(),
                        waited: started.elapsed(),
                    });
                }
            }

            debug!(job_id, status = ?job.status, delay_ms = delay.as_millis() as u64, "Job pending");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl TranscriptionBackend for AssemblyAiBackend {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        let upload_url = self.upload(audio).await?;
        let job_id = self.submit_job(&upload_url).await?;

        info!("Waiting for transcription job {}", job_id);
        let transcript = self.wait_for_completion(&job_id).await?;

        info!(
            segments = transcript.fragments().len(),
            chars = transcript.text().len(),
            "Transcription job {} completed",
            job_id
        );
        Ok(transcript)
    }

    fn name(&self) -> &'static str {
        "assemblyai"
    }
}

/// Body of a successful response. Transport failures while reading map
/// through `transport`; non-2xx statuses become [`TranscriberError::Remote`].
async fn success_body(
    response: reqwest::Response,
    transport: fn(String) -> TranscriberError,
) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport(format!("failed to read response: {}", e)))?;

    if !status.is_success() {
        return Err(TranscriberError::Remote {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}
