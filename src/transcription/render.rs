//! Plain-text rendering of a merged transcript, grouped by speaker runs.

use std::fmt::Write;
use std::path::Path;

use super::transcript::Transcript;
use crate::Result;

/// Render a transcript as a speaker-grouped document.
///
/// Every run of consecutive fragments by one speaker gets a header line
/// `[start - end] speaker:`; the following fragments of the same run are
/// prefixed with their own `[start - end] `. Runs are separated by one blank
/// line. A speaker that comes back after someone else starts a new run.
/// Without fragments the plain text is emitted as-is.
pub fn render(transcript: &Transcript) -> String {
    let fragments = transcript.fragments();
    if fragments.is_empty() {
        return format!("{}\n", transcript.text());
    }

    let mut output = String::new();
    let mut current_speaker: Option<&str> = None;

    for fragment in fragments {
        let start = format_timestamp(fragment.start);
        let end = format_timestamp(fragment.end);

        if current_speaker == Some(fragment.speaker.as_str()) {
            let _ = write!(output, "[{} - {}] ", start, end);
        } else {
            if current_speaker.is_some() {
                output.push('\n');
            }
            let _ = writeln!(output, "[{} - {}] {}:", start, end, fragment.speaker);
            current_speaker = Some(fragment.speaker.as_str());
        }

        output.push_str(fragment.text.trim());
        output.push('\n');
    }

    output
}

/// Render and write a transcript to `path`, replacing any existing file
pub async fn save_to_file(transcript: &Transcript, path: &Path) -> Result<()> {
    tokio::fs::write(path, render(transcript)).await?;
    Ok(())
}

/// Format seconds as `HH:MM:SS`, truncating fractions
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let secs = total % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
