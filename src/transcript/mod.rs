//! Transcript retrieval for YouTube videos.
//!
//! A [`TranscriptSource`] turns a video locator into an ordered [`Transcript`].

mod youtube;

pub use youtube::{extract_video_id, parse_json3, select_caption_url, YoutubeTranscripts};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Trait for transcript providers.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the transcript for a video locator (URL or bare id).
    async fn fetch(&self, locator: &str) -> Result<Transcript>;
}

/// A complete transcript with segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Video ID this transcript belongs to.
    pub video_id: String,
    /// Individual transcript segments with timestamps.
    pub segments: Vec<TranscriptSegment>,
    /// Full transcript text (segments joined by single spaces).
    pub full_text: String,
}

impl Transcript {
    /// Create a new transcript from segments.
    pub fn new(video_id: String, segments: Vec<TranscriptSegment>) -> Self {
        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            video_id,
            segments,
            full_text,
        }
    }

    /// Total duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.segments.last().map(|s| s.end_seconds).unwrap_or(0.0)
    }

    /// Whether the transcript carries any non-whitespace text.
    pub fn is_empty(&self) -> bool {
        self.full_text.trim().is_empty()
    }

    /// Format the transcript with timestamps for display.
    pub fn format_with_timestamps(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("[{} - {}] {}",
                format_timestamp(s.start_seconds),
                format_timestamp(s.end_seconds),
                s.text
            ))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A single segment of a transcript with timestamp information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
    /// Caption text.
    pub text: String,
}

impl TranscriptSegment {
    /// Create a new transcript segment.
    pub fn new(start_seconds: f64, end_seconds: f64, text: String) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text,
        }
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_creation() {
        let segments = vec![
            TranscriptSegment::new(0.0, 5.0, "Hello world".to_string()),
            TranscriptSegment::new(5.0, 10.0, "This is a test".to_string()),
        ];

        let transcript = Transcript::new("test_video".to_string(), segments);

        assert_eq!(transcript.video_id, "test_video");
        assert_eq!(transcript.full_text, "Hello world This is a test");
        assert_eq!(transcript.duration_seconds(), 10.0);
        assert!(!transcript.is_empty());
    }

    #[test]
    fn test_empty_transcript() {
        let transcript = Transcript::new("x".to_string(), Vec::new());
        assert!(transcript.is_empty());
        assert_eq!(transcript.duration_seconds(), 0.0);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }

    #[test]
    fn test_format_with_timestamps() {
        let transcript = Transcript::new(
            "v".to_string(),
            vec![TranscriptSegment::new(61.0, 64.5, "hi".to_string())],
        );
        assert_eq!(transcript.format_with_timestamps(), "[01:01 - 01:04] hi");
    }
}
