use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use super::TrackResolver;
use crate::{
    audio::track::Track,
    error::{MusicError, Result},
};

/// Resolves tracks by shelling out to `yt-dlp`.
pub struct YtDlpResolver {
    binary: String,
    rate_limiter: Semaphore,
}

/// Subset of `yt-dlp --dump-single-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    description: Option<String>,
    #[serde(default)]
    formats: Vec<Format>,
    /// Present when the query was a search; holds the results.
    #[serde(default)]
    entries: Vec<YtDlpInfo>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: Option<String>,
    format: Option<String>,
    format_note: Option<String>,
    vcodec: Option<String>,
}

impl Format {
    fn is_audio_only(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|format| format.contains("audio only"))
            || self.vcodec.as_deref() == Some("none")
    }

    fn quality(&self) -> u8 {
        match self.format_note.as_deref() {
            Some("low") => 1,
            Some("medium") => 2,
            Some("high") => 3,
            _ => 0,
        }
    }
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            // Limit concurrent yt-dlp processes
            rate_limiter: Semaphore::new(3),
        }
    }

    /// URLs are passed through, anything else becomes a single-result search.
    fn target(query: &str) -> String {
        match Url::parse(query) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
            _ => format!("ytsearch1:{}", query),
        }
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requester: UserId) -> Result<Track> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::Resolution(e.to_string()))?;

        let target = Self::target(query.trim());
        info!("🔍 Resolving: {}", target);

        let output = Command::new(&self.binary)
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                target.as_str(),
            ])
            .output()
            .await
            .map_err(|e| MusicError::Resolution(format!("couldn't run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(MusicError::Resolution(error.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_track(&stdout, requester)
    }
}

fn parse_track(json: &str, requester: UserId) -> Result<Track> {
    let info: YtDlpInfo = serde_json::from_str(json)
        .map_err(|e| MusicError::Resolution(format!("unexpected yt-dlp output: {}", e)))?;

    let mut info = if info.entries.is_empty() {
        info
    } else {
        info.entries.into_iter().next().ok_or_else(|| {
            MusicError::Resolution("search returned no results".to_string())
        })?
    };

    let stream_url = best_audio_stream(&info.formats)
        .or_else(|| info.url.take())
        .ok_or_else(|| MusicError::Resolution("no playable stream".to_string()))?;

    let title = info.title.unwrap_or_else(|| "Unknown title".to_string());
    let source_url = info.webpage_url.unwrap_or_else(|| stream_url.clone());
    debug!("🎯 Resolved {} -> {}", title, source_url);

    let mut track = Track::new(title, source_url, stream_url, requester)
        .with_description(info.description.unwrap_or_default());

    if let Some(duration) = info.duration.filter(|d| d.is_finite() && *d >= 0.0) {
        track = track.with_duration(Duration::from_secs_f64(duration));
    }
    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    Ok(track)
}

/// Highest rated audio-only format; the first one wins on equal rating.
fn best_audio_stream(formats: &[Format]) -> Option<String> {
    let mut best: Option<&Format> = None;
    for format in formats.iter().filter(|f| f.url.is_some() && f.is_audio_only()) {
        if best.map_or(true, |b| format.quality() > b.quality()) {
            best = Some(format);
        }
    }
    best.and_then(|format| format.url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO: &str = r#"{
        "title": "Never Gonna Give You Up",
        "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "duration": 212.0,
        "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg",
        "description": "The official video",
        "url": "https://fallback.example/stream",
        "formats": [
            {"url": "https://cdn.example/low", "format": "249 - audio only (low)", "format_note": "low", "vcodec": "none"},
            {"url": "https://cdn.example/high", "format": "251 - audio only (high)", "format_note": "high", "vcodec": "none"},
            {"url": "https://cdn.example/video", "format": "18 - 640x360 (360p)", "format_note": "360p", "vcodec": "avc1"}
        ]
    }"#;

    #[test]
    fn test_picks_highest_quality_audio_stream() {
        let track = parse_track(VIDEO, UserId::new(3)).unwrap();

        assert_eq!(track.title(), "Never Gonna Give You Up");
        assert_eq!(track.source_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(track.stream_url(), "https://cdn.example/high");
        assert_eq!(track.duration(), Some(Duration::from_secs(212)));
        assert_eq!(track.thumbnail_url(), Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg"));
        assert_eq!(track.requester(), UserId::new(3));
    }

    #[test]
    fn test_search_results_use_first_entry() {
        let json = format!(r#"{{"title": "ytsearch1:rick", "entries": [{}]}}"#, VIDEO);
        let track = parse_track(&json, UserId::new(3)).unwrap();
        assert_eq!(track.title(), "Never Gonna Give You Up");
    }

    #[test]
    fn test_falls_back_to_top_level_url() {
        let json = r#"{"title": "Radio", "url": "https://radio.example/live"}"#;
        let track = parse_track(json, UserId::new(3)).unwrap();

        assert_eq!(track.stream_url(), "https://radio.example/live");
        assert_eq!(track.source_url(), "https://radio.example/live");
        assert_eq!(track.duration(), None);
    }

    #[test]
    fn test_missing_stream_is_a_resolution_error() {
        let result = parse_track(r#"{"title": "Nothing"}"#, UserId::new(3));
        assert!(matches!(result, Err(MusicError::Resolution(_))));

        let garbage = parse_track("not json", UserId::new(3));
        assert!(matches!(garbage, Err(MusicError::Resolution(_))));
    }

    #[test]
    fn test_search_phrases_become_ytsearch() {
        assert_eq!(
            YtDlpResolver::target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(YtDlpResolver::target("bohemian rhapsody"), "ytsearch1:bohemian rhapsody");
    }
}
