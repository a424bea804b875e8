use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use serenity::{
    all::{ChannelId, GuildId, Http, Timestamp},
    builder::{CreateEmbed, CreateEmbedFooter, CreateMessage},
};
use std::{sync::Arc, sync::LazyLock, time::Duration};
use tracing::{debug, warn};

use crate::audio::{
    player::SessionSnapshot,
    track::Track,
    voice::{Announcer, NowPlaying},
};

/// Colour palette shared by every embed
pub mod colors {
    use serenity::all::Colour;

    pub const NOW_PLAYING_GREEN: Colour = Colour::from_rgb(0x77, 0xDD, 0x77);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
}

const DESCRIPTION_CHARS: usize = 256;
const DESCRIPTION_LINES: usize = 5;
const LISTING_LINES: usize = 20;

static MARKDOWN_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\\*_~`|])").expect("valid markdown regex"));

/// Backslash-escapes characters Discord would read as Markdown.
pub fn escape_markdown(text: &str) -> String {
    MARKDOWN_CHARS.replace_all(text, r"\$1").into_owned()
}

/// First 256 characters and at most 5 lines of a description, with `...`
/// appended when anything was cut.
pub fn truncate_description(text: &str) -> String {
    let head: String = text.chars().take(DESCRIPTION_CHARS).collect();
    let lines: Vec<&str> = head.split('\n').collect();
    let cut = lines.len() > DESCRIPTION_LINES || text.chars().count() > DESCRIPTION_CHARS;

    let mut description = lines[..lines.len().min(DESCRIPTION_LINES)].join("\n");
    if cut {
        description.push_str("...");
    }
    description
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn next_song_footer(now_playing: &NowPlaying) -> String {
    format!(
        "Next song: {}",
        now_playing.next.as_ref().map_or("none", |track| track.title())
    )
}

/// Announcement for a track that just started.
pub fn now_playing_embed(now_playing: &NowPlaying) -> CreateEmbed {
    let track = &now_playing.track;

    let mut embed = CreateEmbed::new()
        .title(track.title())
        .url(track.source_url())
        .description(truncate_description(track.description()))
        .color(colors::NOW_PLAYING_GREEN)
        .field("Requested by", format!("<@{}>", track.requester()), true);

    if let Some(duration) = track.duration() {
        embed = embed.field("Duration", format_duration(duration), true);
    }

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(next_song_footer(now_playing)))
        .timestamp(requested_timestamp(track))
}

/// When the track was asked for, which is what the embed timestamp shows.
fn requested_timestamp(track: &Track) -> Timestamp {
    Timestamp::from_unix_timestamp(track.requested_at().timestamp())
        .unwrap_or_else(|_| Timestamp::now())
}

/// Numbered listing, cut after [`LISTING_LINES`] entries.
fn listing(lines: impl ExactSizeIterator<Item = String>) -> String {
    let total = lines.len();
    let mut text = lines.take(LISTING_LINES).collect::<Vec<_>>().join("\n");

    if total > LISTING_LINES {
        text.push_str(&format!("\n... and {} more", total - LISTING_LINES));
    }
    text
}

pub fn queue_description(snapshot: &SessionSnapshot) -> String {
    if snapshot.upcoming.is_empty() {
        return "The queue is empty.".to_string();
    }

    listing(
        snapshot
            .upcoming
            .iter()
            .map(|(position, title)| format!("**{}**. {}", position, escape_markdown(title))),
    )
}

pub fn history_description(snapshot: &SessionSnapshot) -> String {
    if snapshot.history.is_empty() {
        return "Nothing has been played yet.".to_string();
    }

    listing(snapshot.history.iter().map(|title| escape_markdown(title)))
}

fn queue_footer(snapshot: &SessionSnapshot) -> String {
    let volume = format!("Volume {}%", snapshot.volume_percent.round());
    if snapshot.queued_duration.is_zero() {
        return volume;
    }
    format!("{} | {} queued", volume, format_duration(snapshot.queued_duration))
}

pub fn queue_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let title = match &snapshot.now_playing {
        Some(track) => format!("Now playing: {}", track.title()),
        None => "Nothing is playing".to_string(),
    };

    CreateEmbed::new()
        .title(title)
        .description(queue_description(snapshot))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(queue_footer(snapshot)))
}

pub fn history_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    CreateEmbed::new()
        .title("Song history (most recent listed first)")
        .description(history_description(snapshot))
        .color(colors::NEUTRAL_GRAY)
}

pub fn error_embed(message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .description(message)
        .color(colors::ERROR_RED)
}

/// Posts now-playing announcements to the text channel each guild last used
/// for a music command.
pub struct ChannelAnnouncer {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|entry| *entry)
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn announce(&self, guild_id: GuildId, now_playing: NowPlaying) {
        let Some(channel_id) = self.channel(guild_id) else {
            debug!("No announcement channel for guild {}", guild_id);
            return;
        };

        let message = CreateMessage::new().embed(now_playing_embed(&now_playing));
        if let Err(e) = channel_id.send_message(&*self.http, message).await {
            warn!("⚠️ Couldn't announce in channel {}: {:?}", channel_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn track(title: &str) -> Track {
        Track::new(title, "https://example.com/watch", "https://example.com/stream", UserId::new(77))
    }

    fn snapshot(upcoming: &[&str], history: &[&str]) -> SessionSnapshot {
        SessionSnapshot {
            now_playing: Some(track("Current")),
            upcoming: upcoming
                .iter()
                .enumerate()
                .map(|(i, title)| (i + 1, title.to_string()))
                .collect(),
            history: history.iter().map(|title| title.to_string()).collect(),
            volume_percent: 10.0,
            queued_duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("*NSYNC_~`|"), r"\*NSYNC\_\~\`\|");
        assert_eq!(escape_markdown(r"AC\DC"), r"AC\\DC");
        assert_eq!(escape_markdown("plain title"), "plain title");
    }

    #[test]
    fn test_short_description_is_untouched() {
        assert_eq!(truncate_description("line one\nline two"), "line one\nline two");
        assert_eq!(truncate_description(""), "");
    }

    #[test]
    fn test_description_is_cut_to_five_lines() {
        let text = "1\n2\n3\n4\n5\n6\n7";
        assert_eq!(truncate_description(text), "1\n2\n3\n4\n5...");
    }

    #[test]
    fn test_description_is_cut_to_256_characters() {
        let text = "é".repeat(300);
        let cut = truncate_description(&text);
        assert_eq!(cut.chars().count(), 256 + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
    }

    #[test]
    fn test_footer_names_the_next_song() {
        let with_next = NowPlaying {
            track: track("a"),
            next: Some(track("b")),
        };
        let last = NowPlaying {
            track: track("a"),
            next: None,
        };

        assert_eq!(next_song_footer(&with_next), "Next song: b");
        assert_eq!(next_song_footer(&last), "Next song: none");
    }

    #[test]
    fn test_queue_and_history_descriptions() {
        let snapshot = snapshot(&["Smells Like Teen Spirit", "Come_As_You_Are"], &["Lithium", "Breed"]);

        assert_eq!(
            queue_description(&snapshot),
            "**1**. Smells Like Teen Spirit\n**2**. Come\\_As\\_You\\_Are"
        );
        assert_eq!(history_description(&snapshot), "Lithium\nBreed");
        assert_eq!(queue_description(&self::snapshot(&[], &[])), "The queue is empty.");
        assert_eq!(history_description(&self::snapshot(&[], &[])), "Nothing has been played yet.");
    }

    #[test]
    fn test_long_listing_is_cut() {
        let titles: Vec<String> = (1..=25).map(|i| format!("song {i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();

        let text = queue_description(&snapshot(&refs, &[]));

        assert_eq!(text.lines().count(), LISTING_LINES + 1);
        assert!(text.ends_with("... and 5 more"));
    }

    #[test]
    fn test_queue_footer_shows_remaining_time() {
        let mut snapshot = snapshot(&["a", "b"], &[]);
        assert_eq!(queue_footer(&snapshot), "Volume 10%");

        snapshot.queued_duration = Duration::from_secs(240);
        assert_eq!(queue_footer(&snapshot), "Volume 10% | 4:00 queued");
    }

    #[test]
    fn test_timestamp_is_request_time() {
        let track = track("a");
        assert_eq!(
            requested_timestamp(&track).unix_timestamp(),
            track.requested_at().timestamp()
        );
    }
}
