//! Video Transcriber - speaker-labeled transcripts for long recordings
//!
//! Converts a video to audio with ffmpeg, sends it (in bounded chunks when it is
//! too long for one call) to a remote diarization service and renders the merged
//! result as a text document grouped by speaker.

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod transcription;

use std::time::Duration;

pub use crate::audio::{AudioExtractor, MediaTool};
pub use crate::config::{BackendKind, Config};
pub use crate::pipeline::{output_path_for, TranscriptionPipeline};
pub use crate::transcription::{
    create_backend, format_timestamp, render, AssemblyAiBackend, ChunkAccumulator, ChunkPlan, ChunkSettings,
    ChunkSpan, ChunkedTranscriber, JobStatus, OpenAiDiarizeBackend, PollPolicy, TimedFragment,
    Transcript, TranscriptionBackend, TranscriptionJob, UNKNOWN_SPEAKER,
};

/// Result type for transcription operations
pub type Result<T> = std::result::Result<T, TranscriberError>;

/// Error types for transcription operations
#[derive(thiserror::Error, Debug)]
pub enum TranscriberError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input error: {0}")]
    Input(String),

    #[error("ffmpeg failed: {message}: {stderr}")]
    Conversion { message: String, stderr: String },

    #[error("Failed to get audio duration: {0}")]
    DurationQuery(String),

    #[error("Failed to extract chunk {index}: {message}")]
    Split { index: usize, message: String },

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Job submission failed: {0}")]
    Submit(String),

    #[error("API request failed with status {status}: {}", single_line(.body))]
    Remote { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Unrecognized status '{status}' for transcription job {job_id}")]
    Poll { job_id: String, status: String },

    #[error("Transcription job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Transcription job {job_id} still pending after {waited:?}")]
    Timeout { job_id: String, waited: Duration },

    #[error("Failed to transcribe chunk {index}")]
    Chunk {
        index: usize,
        #[source]
        source: Box<TranscriberError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Collapse runs of whitespace (including newlines) so multi-line service
/// bodies print as one diagnostic line
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
