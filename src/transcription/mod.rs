pub mod assemblyai;
pub mod backend;
pub mod chunking;
pub mod openai;
pub mod render;
pub mod transcript;

pub use assemblyai::{AssemblyAiBackend, JobStatus, PollPolicy, TranscriptionJob};
pub use backend::{create_backend, TranscriptionBackend};
pub use chunking::{ChunkAccumulator, ChunkPlan, ChunkSettings, ChunkSpan, ChunkedTranscriber, MIN_CHUNK_SECONDS};
pub use openai::OpenAiDiarizeBackend;
pub use render::{format_timestamp, render};
pub use transcript::{normalize_speaker, TimedFragment, Transcript, UNKNOWN_SPEAKER};
