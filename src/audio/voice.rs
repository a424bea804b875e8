use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::sync::Arc;

use super::{player::CompletionNotifier, track::Track};
use crate::error::Result;

/// Audio transport bound to one guild's voice connection.
///
/// Implementations run their own audio pipeline and must call
/// [`CompletionNotifier::notify`] when the started track ends, for any reason.
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    /// Starts streaming `track` at `volume` (0.0 to 2.0), replacing whatever
    /// was playing.
    async fn start(&self, track: &Track, volume: f32, on_end: CompletionNotifier) -> Result<()>;

    /// Stops the current track. The completion notification still fires.
    async fn stop(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn is_paused(&self) -> Result<bool>;

    async fn set_volume(&self, volume: f32) -> Result<()>;

    /// Leaves the voice channel.
    async fn disconnect(&self) -> Result<()>;
}

/// Joins a voice channel for a guild and hands back its output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, guild_id: GuildId) -> Result<Arc<dyn VoiceOutput>>;
}

/// Announcement sent whenever a new track starts.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: Track,
    pub next: Option<Track>,
}

/// Renders announcements to wherever the host surface wants them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, guild_id: GuildId, now_playing: NowPlaying);
}
