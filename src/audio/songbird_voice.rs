use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    player::CompletionNotifier,
    track::Track,
    voice::{VoiceConnector, VoiceOutput},
};
use crate::error::{MusicError, Result};

fn voice_error(e: impl std::fmt::Display) -> MusicError {
    MusicError::Voice(e.to_string())
}

/// [`VoiceOutput`] over a songbird call.
pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdVoice {
    pub fn new(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        call: Arc<tokio::sync::Mutex<Call>>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            manager,
            guild_id,
            call,
            http,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> Result<TrackHandle> {
        self.current.lock().clone().ok_or(MusicError::VoiceNotConnected)
    }
}

#[async_trait]
impl VoiceOutput for SongbirdVoice {
    async fn start(&self, track: &Track, volume: f32, on_end: CompletionNotifier) -> Result<()> {
        let input: Input = HttpRequest::new(self.http.clone(), track.stream_url().to_string()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        handle.set_volume(volume).map_err(voice_error)?;

        // Errored tracks may not raise End; a second notification is stale
        // and gets ignored by the controller.
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    notifier: on_end.clone(),
                },
            )
            .map_err(voice_error)?;
        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackEndNotifier { notifier: on_end },
            )
            .map_err(voice_error)?;

        debug!("🎧 Streaming {} in guild {}", track.stream_url(), self.guild_id);
        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.current()?.stop().map_err(voice_error)
    }

    async fn pause(&self) -> Result<()> {
        self.current()?.pause().map_err(voice_error)
    }

    async fn resume(&self) -> Result<()> {
        self.current()?.play().map_err(voice_error)
    }

    async fn is_paused(&self) -> Result<bool> {
        let state = self.current()?.get_info().await.map_err(voice_error)?;
        Ok(matches!(state.playing, PlayMode::Pause))
    }

    async fn set_volume(&self, volume: f32) -> Result<()> {
        match self.current.lock().as_ref() {
            Some(handle) => handle.set_volume(volume).map_err(voice_error),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.current.lock().take();
        self.manager.remove(self.guild_id).await.map_err(voice_error)?;
        info!("👋 Left voice in guild {}", self.guild_id);
        Ok(())
    }
}

/// Forwards songbird's end-of-track events to the controller.
struct TrackEndNotifier {
    notifier: CompletionNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        debug!("Track ended in guild {}", self.notifier.guild_id());
        self.notifier.notify(reason).await;

        None
    }
}

/// Joins the voice channel the requesting user is sitting in.
///
/// The channel is only needed when the guild is idle, so a user outside voice
/// can still queue onto a running session.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    channel_id: Option<ChannelId>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(
        manager: Arc<Songbird>,
        channel_id: Option<ChannelId>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            manager,
            channel_id,
            http,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(&self, guild_id: GuildId) -> Result<Arc<dyn VoiceOutput>> {
        let channel_id = self.channel_id.ok_or_else(|| {
            MusicError::Voice("join a voice channel first".to_string())
        })?;

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(voice_error)?;

        {
            let mut handler = call.lock().await;
            if let Err(e) = handler.deafen(true).await {
                warn!("⚠️ Couldn't self-deafen in guild {}: {}", guild_id, e);
            }
        }

        info!("🔊 Connected to channel {} in guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdVoice::new(
            self.manager.clone(),
            guild_id,
            call,
            self.http.clone(),
        )))
    }
}
