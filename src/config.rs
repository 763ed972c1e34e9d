use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{Result, TranscriberError};

/// Configuration for the video transcriber
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External converter settings
    pub audio: AudioConfig,

    /// When and how long audio gets split
    pub chunking: ChunkingConfig,

    /// Transcription service settings
    pub transcription: TranscriptionConfig,

    /// Job polling for the asynchronous backend
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ffmpeg executable
    pub ffmpeg_path: String,

    /// ffprobe executable
    pub ffprobe_path: String,

    /// Codec used for the full-length conversion
    pub codec: String,

    /// Variable bitrate quality passed as `-q:a`
    pub quality: String,

    /// Extension of the intermediate audio file
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Longest audio (seconds) sent in a single call
    pub max_single_call_seconds: u64,

    /// Nominal chunk length in seconds
    pub chunk_seconds: u64,

    /// Directory for temporary chunk files (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Which remote protocol to talk to
    pub backend: BackendKind,

    /// HTTP request timeout (seconds)
    pub timeout_seconds: u64,

    pub openai: OpenAiConfig,

    pub assemblyai: AssemblyAiConfig,

    /// Explicit API key; the backend's environment variable is used when unset
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub model: String,
    pub response_format: String,
    pub chunking_strategy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyAiConfig {
    pub base_url: String,
    pub speaker_labels: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay before the second status request
    pub initial_delay_ms: u64,

    /// Upper bound for the growing delay
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after every pending status
    pub backoff_factor: f64,

    /// Give up waiting after this many seconds (0 = wait forever)
    pub timeout_seconds: u64,
}

/// Supported remote transcription protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Synchronous multipart upload, diarized JSON in the response
    OpenAi,
    /// Upload, create a job, poll until it settles
    AssemblyAi,
}

impl BackendKind {
    /// Environment variable holding the API key for this backend
    pub fn api_key_var(&self) -> &'static str {
        match self {
            BackendKind::OpenAi => "OPENAI_API_KEY",
            BackendKind::AssemblyAi => "ASSEMBLYAI_API_KEY",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::OpenAi => write!(f, "openai"),
            BackendKind::AssemblyAi => write!(f, "assemblyai"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = TranscriberError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "assemblyai" => Ok(BackendKind::AssemblyAi),
            other => Err(TranscriberError::Config(format!(
                "unknown transcription backend '{}' (expected openai or assemblyai)",
                other
            ))),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            codec: "libmp3lame".to_string(),
            quality: "2".to_string(),
            format: "mp3".to_string(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_single_call_seconds: 1400, // diarization model limit
            chunk_seconds: 1200,           // 20 minute chunks stay under it
            temp_dir: None,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::OpenAi,
            timeout_seconds: 300, // 5 minutes per request
            openai: OpenAiConfig::default(),
            assemblyai: AssemblyAiConfig::default(),
            api_key: None,
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            model: "gpt-4o-transcribe-diarize".to_string(),
            response_format: "diarized_json".to_string(),
            chunking_strategy: "auto".to_string(),
        }
    }
}

impl Default for AssemblyAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.assemblyai.com".to_string(),
            speaker_labels: true,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3000,
            max_delay_ms: 30_000,
            backoff_factor: 1.5,
            timeout_seconds: 3600,
        }
    }
}

impl TranscriptionConfig {
    /// Resolve the API key for the selected backend
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }

        let var = self.backend.api_key_var();
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(TranscriberError::Config(format!(
                "{} is not set (required by the {} backend)",
                var, self.backend
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    /// Load configuration from an explicit file or the default locations.
    ///
    /// Falls back to defaults when no file exists. Environment overrides are
    /// applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::search_default_paths()?,
        };
        config.apply_env()?;
        Ok(config)
    }

    fn search_default_paths() -> Result<Self> {
        let config_paths = ["video-transcriber.toml", "config/video-transcriber.toml"];

        for path in &config_paths {
            let path = Path::new(path);
            if path.exists() {
                return Self::from_file(path);
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            TranscriberError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&config_str).map_err(|e| match e {
            TranscriberError::Config(msg) => {
                TranscriberError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        tracing::info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).map_err(|e| TranscriberError::Config(e.to_string()))
    }

    /// Override settings from `TRANSCRIBER_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("TRANSCRIBER_BACKEND") {
            self.transcription.backend = backend.parse()?;
        }

        if let Ok(seconds) = std::env::var("TRANSCRIBER_MAX_SINGLE_CALL_SECONDS") {
            self.chunking.max_single_call_seconds = parse_seconds(
                "TRANSCRIBER_MAX_SINGLE_CALL_SECONDS",
                &seconds,
            )?;
        }

        if let Ok(seconds) = std::env::var("TRANSCRIBER_CHUNK_SECONDS") {
            self.chunking.chunk_seconds = parse_seconds("TRANSCRIBER_CHUNK_SECONDS", &seconds)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_seconds == 0 {
            return Err(TranscriberError::Config(
                "chunk_seconds must be greater than 0".to_string(),
            ));
        }

        if self.chunking.chunk_seconds > self.chunking.max_single_call_seconds {
            return Err(TranscriberError::Config(format!(
                "chunk_seconds ({}) must not exceed max_single_call_seconds ({})",
                self.chunking.chunk_seconds, self.chunking.max_single_call_seconds
            )));
        }

        if self.transcription.timeout_seconds == 0 {
            return Err(TranscriberError::Config(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !(self.polling.backoff_factor >= 1.0) {
            return Err(TranscriberError::Config(
                "backoff_factor must be at least 1.0".to_string(),
            ));
        }

        if self.polling.initial_delay_ms > self.polling.max_delay_ms {
            return Err(TranscriberError::Config(
                "initial_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "backend={}, single-call limit={}s, chunk={}s, poll timeout={}",
            self.transcription.backend,
            self.chunking.max_single_call_seconds,
            self.chunking.chunk_seconds,
            match self.polling.timeout_seconds {
                0 => "none".to_string(),
                s => format!("{}s", s),
            }
        )
    }
}

fn parse_seconds(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| TranscriberError::Config(format!("{} must be a whole number of seconds, got '{}'", var, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunking.max_single_call_seconds, 1400);
        assert_eq!(config.chunking.chunk_seconds, 1200);
        assert_eq!(config.transcription.backend, BackendKind::OpenAi);
        assert_eq!(config.transcription.openai.model, "gpt-4o-transcribe-diarize");
        assert_eq!(config.polling.initial_delay_ms, 3000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [chunking]
            chunk_seconds = 600

            [transcription]
            backend = "assemblyai"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_seconds, 600);
        assert_eq!(config.chunking.max_single_call_seconds, 1400);
        assert_eq!(config.transcription.backend, BackendKind::AssemblyAi);
        assert_eq!(config.audio.codec, "libmp3lame");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[chunking]\nchunk_seconds = \"long\"").unwrap_err();
        assert!(matches!(err, TranscriberError::Config(_)));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.chunking.chunk_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunking.chunk_seconds = 2000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.polling.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("openai".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert_eq!(" AssemblyAI ".parse::<BackendKind>().unwrap(), BackendKind::AssemblyAi);
        assert!("whisper".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::AssemblyAi.to_string(), "assemblyai");
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let mut config = TranscriptionConfig::default();
        config.api_key = Some("sk-test".to_string());
        assert_eq!(config.resolve_api_key().unwrap(), "sk-test");
    }
}
