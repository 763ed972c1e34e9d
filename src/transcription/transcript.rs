use serde::{Deserialize, Serialize};

/// Label used when the service returns no speaker for a fragment
pub const UNKNOWN_SPEAKER: &str = "Unknown";

/// Map a missing or blank speaker label to [`UNKNOWN_SPEAKER`]
pub fn normalize_speaker(label: Option<&str>) -> String {
    match label.map(str::trim) {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => UNKNOWN_SPEAKER.to_string(),
    }
}

/// One speaker-labeled piece of text with its position in the audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedFragment {
    /// Speaker label, never empty
    pub speaker: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
}

impl TimedFragment {
    pub fn new(speaker: Option<&str>, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            speaker: normalize_speaker(speaker),
            start,
            end,
            text: text.into(),
        }
    }

    /// Copy of this fragment moved `offset` seconds later
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            speaker: self.speaker.clone(),
            start: self.start + offset,
            end: self.end + offset,
            text: self.text.clone(),
        }
    }
}

/// Complete transcription of one audio unit (or a merged set of chunks)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    text: String,
    fragments: Vec<TimedFragment>,
}

impl Transcript {
    pub fn new(text: impl Into<String>, fragments: Vec<TimedFragment>) -> Self {
        Self {
            text: text.into(),
            fragments,
        }
    }

    /// Plain text as returned by the service
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Time-ordered fragments
    pub fn fragments(&self) -> &[TimedFragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.fragments.is_empty()
    }
}
