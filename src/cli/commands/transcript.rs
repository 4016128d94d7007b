//! Transcript command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::transcript::{TranscriptSource, YoutubeTranscripts};
use anyhow::Result;

/// Print a video's transcript with timestamps.
pub async fn run_transcript(url: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Transcript, &settings.transcript.ytdlp_path) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tubetalk doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let source = YoutubeTranscripts::with_settings(&settings.transcript);

    let spinner = Output::spinner("Fetching transcript...");
    let transcript = source.fetch(url).await;
    spinner.finish_and_clear();

    let transcript = match transcript {
        Ok(transcript) => transcript,
        Err(e) => {
            Output::error(&format!("Failed to fetch transcript: {}", e));
            return Err(e.into());
        }
    };

    if transcript.is_empty() {
        Output::warning(&format!("Transcript for {} contains no text.", transcript.video_id));
        return Ok(());
    }

    Output::header(&format!("Transcript {}", transcript.video_id));
    println!("{}", transcript.format_with_timestamps());

    Ok(())
}
