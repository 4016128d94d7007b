//! YouTube caption retrieval.
//!
//! Caption tracks are discovered with `yt-dlp --dump-json` and downloaded in
//! YouTube's `json3` timed-text format.

use super::{Transcript, TranscriptSegment, TranscriptSource};
use crate::config::TranscriptSettings;
use crate::error::{Result, TubetalkError};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

static VIDEO_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Matches various YouTube URL formats and bare video IDs
    Regex::new(
        r"(?x)
        (?:
            (?:https?://)?
            (?:www\.|m\.)?
            (?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/|youtube\.com/live/)
            ([a-zA-Z0-9_-]{11})
        )
        |
        ^([a-zA-Z0-9_-]{11})$
    ",
    )
    .expect("Invalid regex")
});

/// Extract the 11-character video ID from a YouTube URL or bare ID.
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if let Some(caps) = VIDEO_ID_REGEX.captures(input) {
        return caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string());
    }

    // watch URLs where `v` is not the first query parameter
    let url = Url::parse(input).ok()?;
    if !url.host_str()?.ends_with("youtube.com") {
        return None;
    }
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|id| id.len() == 11 && VIDEO_ID_REGEX.is_match(id))
}

/// Pick a caption track URL from yt-dlp's info JSON.
///
/// Manual subtitles win over automatic captions. Within each group the
/// preferred languages are tried in order, exact key first, then regional
/// variants (`en` matches `en-GB`). The returned URL always requests `json3`.
pub fn select_caption_url(
    info: &serde_json::Value,
    languages: &[String],
    allow_auto_captions: bool,
) -> Option<String> {
    let mut groups = vec!["subtitles"];
    if allow_auto_captions {
        groups.push("automatic_captions");
    }

    for group in groups {
        let Some(tracks) = info[group].as_object() else {
            continue;
        };

        for lang in languages {
            let regional = format!("{}-", lang);
            let key = tracks
                .keys()
                .find(|k| *k == lang)
                .or_else(|| tracks.keys().find(|k| k.starts_with(&regional)));

            let Some(formats) = key.and_then(|k| tracks[k].as_array()) else {
                continue;
            };

            let json3 = formats
                .iter()
                .find(|f| f["ext"].as_str() == Some("json3"))
                .and_then(|f| f["url"].as_str());

            if let Some(url) = json3 {
                return Some(url.to_string());
            }

            if let Some(url) = formats.iter().find_map(|f| f["url"].as_str()) {
                return Some(force_json3(url));
            }
        }
    }

    None
}

fn force_json3(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let pairs: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "fmt")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(pairs)
                .append_pair("fmt", "json3");
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

#[derive(Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a `json3` caption document into ordered segments.
///
/// Events without text (line breaks, window styling) are skipped.
pub fn parse_json3(body: &str) -> Result<Vec<TranscriptSegment>> {
    let doc: Json3 = serde_json::from_str(body)
        .map_err(|e| TubetalkError::Retrieval(format!("Malformed caption document: {}", e)))?;

    let segments = doc
        .events
        .into_iter()
        .filter_map(|event| {
            let raw: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            let start = event.t_start_ms as f64 / 1000.0;
            let end = event.t_start_ms.saturating_add(event.d_duration_ms) as f64 / 1000.0;
            Some(TranscriptSegment::new(start, end, text))
        })
        .collect();

    Ok(segments)
}

/// Transcript source backed by YouTube captions.
pub struct YoutubeTranscripts {
    http: reqwest::Client,
    ytdlp_path: String,
    languages: Vec<String>,
    allow_auto_captions: bool,
}

impl YoutubeTranscripts {
    pub fn new() -> Self {
        Self::with_settings(&TranscriptSettings::default())
    }

    pub fn with_settings(settings: &TranscriptSettings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            ytdlp_path: settings.ytdlp_path.clone(),
            languages: settings.languages.clone(),
            allow_auto_captions: settings.allow_auto_captions,
        }
    }

    /// Fetch the video's info JSON using yt-dlp.
    async fn fetch_info(&self, video_id: &str) -> Result<serde_json::Value> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);

        let output = tokio::process::Command::new(&self.ytdlp_path)
            .args(["--dump-json", "--skip-download", "--no-warnings", &url])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TubetalkError::ToolNotFound(self.ytdlp_path.clone())
                } else {
                    TubetalkError::Retrieval(format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TubetalkError::Retrieval(format!(
                "Video {} not found or unavailable: {}",
                video_id,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            TubetalkError::Retrieval(format!("Failed to parse yt-dlp output: {}", e))
        })
    }

    async fn download_captions(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

impl Default for YoutubeTranscripts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscripts {
    #[instrument(skip(self))]
    async fn fetch(&self, locator: &str) -> Result<Transcript> {
        let video_id = extract_video_id(locator).ok_or_else(|| {
            TubetalkError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", locator))
        })?;

        info!("Fetching captions for {}", video_id);
        let info = self.fetch_info(&video_id).await?;

        let caption_url = select_caption_url(&info, &self.languages, self.allow_auto_captions)
            .ok_or_else(|| {
                TubetalkError::Retrieval(format!(
                    "No captions in [{}] for video {}",
                    self.languages.join(", "),
                    video_id
                ))
            })?;

        debug!("Downloading caption track");
        let body = self.download_captions(&caption_url).await?;
        let segments = parse_json3(&body)?;
        debug!("Parsed {} caption segments", segments.len());

        Ok(Transcript::new(video_id, segments))
    }
}
