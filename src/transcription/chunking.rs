//! Splitting long audio into bounded chunks and merging their transcripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, info, warn};

use super::backend::TranscriptionBackend;
use super::transcript::{TimedFragment, Transcript};
use crate::audio::MediaTool;
use crate::config::ChunkingConfig;
use crate::{Result, TranscriberError};

/// Shortest span worth extracting; range lengths are passed to ffmpeg with
/// millisecond precision, so anything below rounds to nothing
pub const MIN_CHUNK_SECONDS: f64 = 0.001;

/// One contiguous slice of the source audio
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    /// Position in the plan, 0-based
    pub index: usize,
    /// Where the slice starts in the source, in whole seconds
    pub offset_seconds: u64,
    /// Slice length; only the last span can be shorter than the nominal length
    pub duration_seconds: f64,
}

impl ChunkSpan {
    pub fn end_seconds(&self) -> f64 {
        self.offset_seconds as f64 + self.duration_seconds
    }

    /// True for the (near) zero-length tail left when the total is an exact
    /// multiple of the chunk length
    pub fn is_empty(&self) -> bool {
        self.duration_seconds < MIN_CHUNK_SECONDS
    }
}

/// Ordered, contiguous chunk boundaries covering `[0, total]`
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    total_seconds: f64,
    spans: Vec<ChunkSpan>,
}

impl ChunkPlan {
    /// Plan `floor(total / chunk_seconds) + 1` spans of `chunk_seconds`, the
    /// last one holding whatever remains.
    pub fn new(total_seconds: f64, chunk_seconds: u64) -> Result<Self> {
        if chunk_seconds == 0 {
            return Err(TranscriberError::Config(
                "chunk length must be greater than 0".to_string(),
            ));
        }
        if !total_seconds.is_finite() || total_seconds <= 0.0 {
            return Err(TranscriberError::DurationQuery(format!(
                "cannot split audio of duration {}",
                total_seconds
            )));
        }

        let count = (total_seconds / chunk_seconds as f64).floor() as usize + 1;
        let spans = (0..count)
            .map(|index| {
                let offset_seconds = index as u64 * chunk_seconds;
                let duration_seconds = if index + 1 == count {
                    total_seconds - offset_seconds as f64
                } else {
                    chunk_seconds as f64
                };
                ChunkSpan {
                    index,
                    offset_seconds,
                    duration_seconds,
                }
            })
            .collect();

        Ok(Self {
            total_seconds,
            spans,
        })
    }

    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }
}

/// Running merge of per-chunk transcripts
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    text: String,
    fragments: Vec<TimedFragment>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk's transcript, moving its timestamps by the span offset
    pub fn push(&mut self, span: &ChunkSpan, transcript: &Transcript) {
        let offset = span.offset_seconds as f64;
        self.fragments
            .extend(transcript.fragments().iter().map(|f| f.shifted(offset)));

        if !transcript.text().is_empty() {
            self.text.push_str(transcript.text());
            self.text.push(' ');
        }
    }

    pub fn finish(self) -> Transcript {
        Transcript::new(self.text.trim(), self.fragments)
    }
}

/// Thresholds that decide whether and how audio is split
#[derive(Debug, Clone)]
pub struct ChunkSettings {
    /// Longest audio sent in a single call; equal durations are not split
    pub max_single_call_seconds: u64,
    /// Nominal chunk length
    pub chunk_seconds: u64,
    /// Where temporary chunk files go (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

impl ChunkSettings {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            max_single_call_seconds: config.max_single_call_seconds,
            chunk_seconds: config.chunk_seconds,
            temp_dir: config.temp_dir.clone(),
        }
    }
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

/// Drives the backend over an audio file, one chunk at a time
pub struct ChunkedTranscriber {
    media: Arc<dyn MediaTool>,
    backend: Arc<dyn TranscriptionBackend>,
    settings: ChunkSettings,
}

impl ChunkedTranscriber {
    pub fn new(
        media: Arc<dyn MediaTool>,
        backend: Arc<dyn TranscriptionBackend>,
        settings: ChunkSettings,
    ) -> Self {
        Self {
            media,
            backend,
            settings,
        }
    }

    pub fn settings(&self) -> &ChunkSettings {
        &self.settings
    }

    /// Transcribe `audio`, splitting it first when it is longer than the
    /// single-call limit. Chunks are extracted and transcribed strictly in
    /// order; the first failure aborts the run.
    pub async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        let duration = self.media.probe_duration(audio).await?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(TranscriberError::DurationQuery(format!(
                "{} has no measurable duration ({})",
                audio.display(),
                duration
            )));
        }

        if duration <= self.settings.max_single_call_seconds as f64 {
            info!(
                "Transcribing {:.0}s of audio with speaker diarization via {}...",
                duration,
                self.backend.name()
            );
            return self.backend.transcribe(audio).await;
        }

        info!("Audio is {:.0} seconds, splitting into chunks...", duration);
        let plan = ChunkPlan::new(duration, self.settings.chunk_seconds)?;
        info!("Split {:.0}s into {} chunks", plan.total_seconds(), plan.len());

        let mut merged = ChunkAccumulator::new();
        for span in plan.spans() {
            if span.is_empty() {
                debug!("Skipping empty trailing chunk {}", span.index);
                continue;
            }

            info!("Transcribing chunk {}/{}...", span.index + 1, plan.len());
            let chunk_audio = self.extract_chunk(audio, span).await?;

            let transcript = self
                .backend
                .transcribe(&chunk_audio)
                .await
                .map_err(|e| TranscriberError::Chunk {
                    index: span.index,
                    source: Box::new(e),
                })?;

            merged.push(span, &transcript);

            if let Err(e) = chunk_audio.close() {
                warn!("Failed to remove temp chunk {}: {}", span.index, e);
            }
        }

        Ok(merged.finish())
    }

    /// Cut one span into its own temp file; the file goes away when the
    /// returned path is dropped.
    async fn extract_chunk(&self, audio: &Path, span: &ChunkSpan) -> Result<TempPath> {
        let prefix = format!("chunk-{}-", span.index);
        let suffix = format!(
            ".{}",
            audio.extension().and_then(|ext| ext.to_str()).unwrap_or("mp3")
        );

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(&suffix);
        let file = match &self.settings.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| TranscriberError::Split {
            index: span.index,
            message: format!("failed to create temp chunk file: {}", e),
        })?;
        let chunk_path = file.into_temp_path();

        self.media
            .extract_range(audio, &chunk_path, span.offset_seconds, span.duration_seconds)
            .await
            .map_err(|e| TranscriberError::Split {
                index: span.index,
                message: e.to_string(),
            })?;

        debug!(
            "Chunk {} covers {}s..{:.3}s -> {}",
            span.index,
            span.offset_seconds,
            span.end_seconds(),
            chunk_path.display()
        );
        Ok(chunk_path)
    }
}
