use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    queue::{PlaybackQueue, DEFAULT_CAPACITY, DEFAULT_MATCH_THRESHOLD},
    track::Track,
    voice::VoiceOutput,
};

/// Per-guild defaults applied on creation and on every reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub capacity: usize,
    pub default_volume: f32,
    pub match_threshold: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            default_volume: 0.1,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Mutable playback state of one guild.
pub struct GuildSession {
    guild_id: GuildId,
    settings: SessionSettings,
    pub(crate) queue: PlaybackQueue,
    pub(crate) volume: f32,
    pub(crate) now_playing: Option<Track>,
    pub(crate) voice: Option<Arc<dyn VoiceOutput>>,
    /// Bumped every time a track is started or the session is reset, so a
    /// completion carrying an older value is known to be stale.
    pub(crate) epoch: u64,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, settings: SessionSettings) -> Self {
        Self {
            guild_id,
            settings,
            queue: PlaybackQueue::with_threshold(settings.capacity, settings.match_threshold),
            volume: settings.default_volume,
            now_playing: None,
            voice: None,
            epoch: 0,
        }
    }

    /// Restores queue, history, now-playing and volume to their defaults.
    /// The voice handle is left to the caller.
    pub fn reset(&mut self) {
        self.queue = PlaybackQueue::with_threshold(self.settings.capacity, self.settings.match_threshold);
        self.volume = self.settings.default_volume;
        self.now_playing = None;
        self.epoch += 1;
        debug!("♻️ Session reset for guild {}", self.guild_id);
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.voice.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.voice.is_some() && self.now_playing.is_some()
    }
}

impl std::fmt::Debug for GuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildSession")
            .field("guild_id", &self.guild_id)
            .field("queued", &self.queue.len())
            .field("volume", &self.volume)
            .field("now_playing", &self.now_playing.as_ref().map(Track::title))
            .field("connected", &self.voice.is_some())
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Process-wide map from guild to session. Sessions are created on first
/// access and live as long as the process.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Mutex<GuildSession>>>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
        }
    }

    /// Returns the session for `guild_id`, creating it if needed.
    pub fn get(&self, guild_id: GuildId) -> Arc<Mutex<GuildSession>> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🆕 New music session for guild {}", guild_id);
                Arc::new(Mutex::new(GuildSession::new(guild_id, self.settings)))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
