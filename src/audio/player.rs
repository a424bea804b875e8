use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    session::{GuildSession, SessionRegistry},
    track::Track,
    voice::{Announcer, NowPlaying, VoiceConnector, VoiceOutput},
};
use crate::error::{MusicError, Result};

/// Outcome of [`PlaybackController::enqueue_or_start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Nothing was playing; the track started right away.
    Started,
    /// Something was playing, or older tracks were still waiting; the track
    /// waits at this 1-based position.
    Queued { position: usize },
}

/// Outcome of [`PlaybackController::toggle_pause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseToggle {
    Idle,
    Paused,
    Resumed,
}

/// Read-only view of a session for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub now_playing: Option<Track>,
    pub upcoming: Vec<(usize, String)>,
    pub history: Vec<String>,
    pub volume_percent: f64,
    /// Sum of the known durations of the upcoming tracks
    pub queued_duration: Duration,
}

/// Drives the play, completion, play-next cycle of every guild.
///
/// Cloning is cheap; clones share the registry and the announcer.
#[derive(Clone)]
pub struct PlaybackController {
    registry: Arc<SessionRegistry>,
    announcer: Arc<dyn Announcer>,
}

impl PlaybackController {
    pub fn new(registry: Arc<SessionRegistry>, announcer: Arc<dyn Announcer>) -> Self {
        Self {
            registry,
            announcer,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Starts `track` if the guild is idle, otherwise queues it.
    pub async fn enqueue_or_start(
        &self,
        guild_id: GuildId,
        track: Track,
        connector: &dyn VoiceConnector,
    ) -> Result<Enqueued> {
        let session = self.registry.get(guild_id);
        let (announcement, outcome) = {
            let mut session = session.lock().await;

            if session.is_playing() {
                session.queue.add_track(track)?;
                return Ok(Enqueued::Queued {
                    position: session.queue.len(),
                });
            }

            if session.voice.is_none() {
                let voice = connector.connect(guild_id).await?;
                info!("🔊 Voice output bound for guild {}", guild_id);
                session.voice = Some(voice);
            }

            // Tracks left over from a lost connection keep their turn
            let started = if session.queue.is_empty() {
                if let Err(e) = self.start_track(&mut session, track.clone()).await {
                    error!("❌ Couldn't start {}: {}", track.title(), e);
                    self.go_idle(&mut session).await;
                    return Err(e);
                }
                session.queue.record_played(track.clone());
                track.clone()
            } else {
                if let Err(e) = session.queue.add_track(track.clone()) {
                    self.go_idle(&mut session).await;
                    return Err(e);
                }
                match self.advance(&mut session).await {
                    Some(started) => started,
                    None => {
                        self.go_idle(&mut session).await;
                        return Err(MusicError::Voice(
                            "none of the queued tracks could be started".to_string(),
                        ));
                    }
                }
            };

            let outcome = if started == track {
                Enqueued::Started
            } else {
                Enqueued::Queued {
                    position: session.queue.len(),
                }
            };

            (
                NowPlaying {
                    next: session.queue.next_track().cloned(),
                    track: started,
                },
                outcome,
            )
        };

        self.announcer.announce(guild_id, announcement).await;
        Ok(outcome)
    }

    /// Called by the voice output when the current track has ended.
    ///
    /// Completions that belong to an earlier track, or that arrive after the
    /// session was reset, are ignored.
    pub async fn on_track_end(&self, guild_id: GuildId, epoch: u64, reason: Option<String>) {
        let session = self.registry.get(guild_id);
        let announcement = {
            let mut session = session.lock().await;

            if session.epoch != epoch || !session.is_playing() {
                debug!("Ignoring stale completion for guild {} (epoch {})", guild_id, epoch);
                return;
            }

            if let Some(reason) = reason {
                warn!("⚠️ Track ended with an error in guild {}: {}", guild_id, reason);
            }

            match self.advance(&mut session).await {
                Some(track) => NowPlaying {
                    next: session.queue.next_track().cloned(),
                    track,
                },
                None => {
                    info!("📭 Queue drained for guild {}, leaving voice", guild_id);
                    self.go_idle(&mut session).await;
                    return;
                }
            }
        };

        self.announcer.announce(guild_id, announcement).await;
    }

    /// Resets the session, whatever state it is in, then disconnects.
    ///
    /// The reset is visible to other commands before the voice teardown
    /// finishes.
    pub async fn stop(&self, guild_id: GuildId) -> Result<()> {
        let session = self.registry.get(guild_id);
        let voice = {
            let mut session = session.lock().await;
            let voice = session.voice.take();
            session.reset();
            voice
        };
        info!("⏹️ Playback stopped for guild {}", guild_id);

        if let Some(voice) = voice {
            if let Err(e) = voice.disconnect().await {
                warn!("⚠️ Disconnect failed for guild {}: {}", guild_id, e);
            }
        }
        Ok(())
    }

    /// Sets the volume from a user-facing percentage (0 to 200).
    pub async fn set_volume(&self, guild_id: GuildId, percent: f64) -> Result<()> {
        if !(0.0..=200.0).contains(&percent) {
            return Err(MusicError::OutOfRange { value: percent });
        }

        let session = self.registry.get(guild_id);
        let mut session = session.lock().await;
        let volume = (percent / 100.0) as f32;
        session.volume = volume;

        if let Some(voice) = &session.voice {
            voice.set_volume(volume).await?;
        }

        info!("🔊 Volume set to {}% for guild {}", percent, guild_id);
        Ok(())
    }

    /// Pauses a playing track or resumes a paused one.
    pub async fn toggle_pause(&self, guild_id: GuildId) -> Result<PauseToggle> {
        let session = self.registry.get(guild_id);
        let session = session.lock().await;

        let voice = match (&session.voice, &session.now_playing) {
            (Some(voice), Some(_)) => voice,
            _ => return Ok(PauseToggle::Idle),
        };

        if voice.is_paused().await? {
            voice.resume().await?;
            info!("▶️ Playback resumed for guild {}", guild_id);
            Ok(PauseToggle::Resumed)
        } else {
            voice.pause().await?;
            info!("⏸️ Playback paused for guild {}", guild_id);
            Ok(PauseToggle::Paused)
        }
    }

    /// Ends the current track and drops the next `count - 1` queued ones.
    pub async fn skip(&self, guild_id: GuildId, count: i64) -> Result<usize> {
        if count < 1 {
            return Err(MusicError::InvalidArgument(
                "number of songs to skip must be at least 1".to_string(),
            ));
        }

        let session = self.registry.get(guild_id);
        let mut session = session.lock().await;
        let voice = playing_voice(&session)?;

        // The completion this triggers waits on the lock, so it sees the
        // queue after the drop below.
        voice.stop().await?;
        let dropped = session.queue.skip(count - 1)?;
        Ok(dropped + 1)
    }

    /// Drops every queued track before the best match for `name` and ends the
    /// current one, so the match plays next.
    pub async fn jump_to(&self, guild_id: GuildId, name: &str) -> Result<Track> {
        let session = self.registry.get(guild_id);
        let mut session = session.lock().await;
        let voice = playing_voice(&session)?;

        let index = session.queue.search_queue(name)?;
        voice.stop().await?;
        session.queue.skip(index as i64)?;
        let target = session
            .queue
            .next_track()
            .cloned()
            .ok_or(MusicError::QueueEmpty)?;

        info!("⏩ Jumping to {} in guild {}", target.title(), guild_id);
        Ok(target)
    }

    /// Removes the best match for `name` from the queue.
    pub async fn remove(&self, guild_id: GuildId, name: &str) -> Result<Track> {
        let session = self.registry.get(guild_id);
        let mut session = session.lock().await;
        session.queue.delete_track(name)
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> Result<()> {
        let session = self.registry.get(guild_id);
        let mut session = session.lock().await;
        if session.queue.is_empty() {
            return Err(MusicError::QueueEmpty);
        }
        session.queue.shuffle();
        Ok(())
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> SessionSnapshot {
        let session = self.registry.get(guild_id);
        let session = session.lock().await;

        SessionSnapshot {
            now_playing: session.now_playing.clone(),
            upcoming: session.queue.queue_listing(),
            history: session.queue.history_listing(),
            volume_percent: f64::from(session.volume) * 100.0,
            queued_duration: session.queue.total_duration(),
        }
    }

    /// The voice connection went away underneath us (kicked, channel deleted).
    /// Drops the handle and anything playing; the queue is kept.
    pub async fn handle_disconnect(&self, guild_id: GuildId) {
        let session = self.registry.get(guild_id);
        let mut session = session.lock().await;

        if session.voice.take().is_some() {
            session.now_playing = None;
            session.epoch += 1;
            info!("🔌 Voice connection lost for guild {}", guild_id);
        }
    }

    /// Pops queued tracks until one starts. Returns `None` once the queue is
    /// exhausted.
    async fn advance(&self, session: &mut GuildSession) -> Option<Track> {
        while let Ok(track) = session.queue.pop_track() {
            match self.start_track(session, track.clone()).await {
                Ok(()) => return Some(track),
                Err(e) => error!("❌ Couldn't start {}, trying the next one: {}", track.title(), e),
            }
        }
        None
    }

    async fn start_track(&self, session: &mut GuildSession, track: Track) -> Result<()> {
        let voice = session.voice.clone().ok_or(MusicError::VoiceNotConnected)?;

        session.epoch += 1;
        let notifier = CompletionNotifier {
            controller: self.clone(),
            guild_id: session.guild_id(),
            epoch: session.epoch,
        };

        voice.start(&track, session.volume, notifier).await?;
        info!("🎵 Now playing in guild {}: {}", session.guild_id(), track.title());
        session.now_playing = Some(track);
        Ok(())
    }

    async fn go_idle(&self, session: &mut GuildSession) {
        session.now_playing = None;
        session.epoch += 1;

        if let Some(voice) = session.voice.take() {
            if let Err(e) = voice.disconnect().await {
                warn!("⚠️ Disconnect failed for guild {}: {}", session.guild_id(), e);
            }
        }
    }
}

fn playing_voice(session: &GuildSession) -> Result<Arc<dyn VoiceOutput>> {
    match (&session.voice, &session.now_playing) {
        (Some(voice), Some(_)) => Ok(voice.clone()),
        _ => Err(MusicError::VoiceNotConnected),
    }
}

/// Handle given to a voice output when a track starts; it reports the end of
/// that specific track back to the controller.
#[derive(Clone)]
pub struct CompletionNotifier {
    controller: PlaybackController,
    guild_id: GuildId,
    epoch: u64,
}

impl CompletionNotifier {
    pub async fn notify(&self, reason: Option<String>) {
        self.controller
            .on_track_end(self.guild_id, self.epoch, reason)
            .await;
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }
}

impl std::fmt::Debug for CompletionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionNotifier")
            .field("guild_id", &self.guild_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        session::SessionSettings,
        voice::{MockAnnouncer, MockVoiceConnector},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;
    use tokio::sync::Notify;

    /// Voice output that records calls and keeps the last notifier so tests
    /// can finish tracks on demand.
    #[derive(Default)]
    struct FakeVoice {
        started: Mutex<Vec<(String, f32)>>,
        notifiers: Mutex<Vec<CompletionNotifier>>,
        volume: Mutex<Option<f32>>,
        paused: Mutex<bool>,
        stops: Mutex<usize>,
        disconnects: Mutex<usize>,
        fail_titles: Vec<String>,
        fail_stop: bool,
        /// When set, `disconnect` hangs until the gate is notified.
        disconnect_gate: Option<Arc<Notify>>,
    }

    impl FakeVoice {
        fn failing_on(titles: &[&str]) -> Self {
            Self {
                fail_titles: titles.iter().map(|t| t.to_string()).collect(),
                ..Self::default()
            }
        }

        fn started_titles(&self) -> Vec<String> {
            self.started.lock().iter().map(|(t, _)| t.clone()).collect()
        }

        fn last_notifier(&self) -> CompletionNotifier {
            self.notifiers.lock().last().cloned().expect("nothing started")
        }

        async fn finish_current(&self) {
            self.last_notifier().notify(None).await;
        }
    }

    #[async_trait]
    impl VoiceOutput for FakeVoice {
        async fn start(&self, track: &Track, volume: f32, on_end: CompletionNotifier) -> Result<()> {
            if self.fail_titles.iter().any(|t| t == track.title()) {
                return Err(MusicError::Voice(format!("cannot stream {}", track.title())));
            }
            self.started.lock().push((track.title().to_string(), volume));
            self.notifiers.lock().push(on_end);
            *self.paused.lock() = false;
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            if self.fail_stop {
                return Err(MusicError::Voice("track handle is gone".to_string()));
            }
            *self.stops.lock() += 1;
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            *self.paused.lock() = true;
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            *self.paused.lock() = false;
            Ok(())
        }

        async fn is_paused(&self) -> Result<bool> {
            Ok(*self.paused.lock())
        }

        async fn set_volume(&self, volume: f32) -> Result<()> {
            *self.volume.lock() = Some(volume);
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            *self.disconnects.lock() += 1;
            if let Some(gate) = &self.disconnect_gate {
                gate.notified().await;
            }
            Ok(())
        }
    }

    fn guild() -> GuildId {
        GuildId::new(1234)
    }

    fn track(title: &str) -> Track {
        Track::new(title, "https://example.com/watch", "https://example.com/stream", UserId::new(5))
    }

    fn quiet_announcer() -> Arc<MockAnnouncer> {
        let mut announcer = MockAnnouncer::new();
        announcer.expect_announce().returning(|_, _| ());
        Arc::new(announcer)
    }

    fn controller_with(announcer: Arc<MockAnnouncer>) -> PlaybackController {
        let registry = Arc::new(SessionRegistry::new(SessionSettings::default()));
        PlaybackController::new(registry, announcer)
    }

    fn connector_for(voice: Arc<FakeVoice>) -> MockVoiceConnector {
        let mut connector = MockVoiceConnector::new();
        connector.expect_connect().returning(move |_| {
            let voice: Arc<dyn VoiceOutput> = voice.clone();
            Ok(voice)
        });
        connector
    }

    #[tokio::test]
    async fn test_first_track_starts_and_later_ones_queue() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let mut connector = MockVoiceConnector::new();
        let bound = voice.clone();
        connector.expect_connect().times(1).returning(move |_| {
            let voice: Arc<dyn VoiceOutput> = bound.clone();
            Ok(voice)
        });

        assert_eq!(
            controller.enqueue_or_start(guild(), track("first"), &connector).await,
            Ok(Enqueued::Started)
        );
        assert_eq!(
            controller.enqueue_or_start(guild(), track("second"), &connector).await,
            Ok(Enqueued::Queued { position: 1 })
        );

        let snapshot = controller.snapshot(guild()).await;
        assert_eq!(snapshot.now_playing.map(|t| t.title().to_string()), Some("first".to_string()));
        assert_eq!(snapshot.upcoming, vec![(1, "second".to_string())]);
        assert_eq!(snapshot.history, vec!["first".to_string()]);
        assert_eq!(voice.started_titles(), vec!["first"]);
        assert_eq!(voice.started.lock()[0].1, 0.1);
    }

    #[tokio::test]
    async fn test_completion_plays_next_and_announces_successor() {
        let mut announcer = MockAnnouncer::new();
        let announced = Arc::new(Mutex::new(Vec::new()));
        let sink = announced.clone();
        announcer.expect_announce().returning(move |_, now_playing| {
            sink.lock().push((
                now_playing.track.title().to_string(),
                now_playing.next.map(|t| t.title().to_string()),
            ));
        });
        let controller = controller_with(Arc::new(announcer));
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());

        for title in ["a", "b", "c"] {
            controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
        }
        voice.finish_current().await;

        assert_eq!(voice.started_titles(), vec!["a", "b"]);
        assert_eq!(
            *announced.lock(),
            vec![
                ("a".to_string(), None),
                ("b".to_string(), Some("c".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_drained_queue_goes_idle() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());

        controller.enqueue_or_start(guild(), track("only"), &connector).await.unwrap();
        voice.finish_current().await;

        let session = controller.registry().get(guild());
        let session = session.lock().await;
        assert!(!session.is_playing());
        assert!(!session.is_connected());
        assert_eq!(*voice.disconnects.lock(), 1);
    }

    #[tokio::test]
    async fn test_completion_after_stop_is_a_noop() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());

        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();
        controller.enqueue_or_start(guild(), track("b"), &connector).await.unwrap();
        let notifier = voice.last_notifier();

        controller.stop(guild()).await.unwrap();
        notifier.notify(Some("stopped".to_string())).await;

        let snapshot = controller.snapshot(guild()).await;
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.upcoming.is_empty());
        assert_eq!(voice.started_titles(), vec!["a"]);
        assert_eq!(*voice.disconnects.lock(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_completion_only_advances_once() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());

        for title in ["a", "b", "c"] {
            controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
        }
        let notifier = voice.last_notifier();
        notifier.notify(None).await;
        notifier.notify(None).await;

        assert_eq!(voice.started_titles(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_start_moves_on_to_next_track() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::failing_on(&["broken"]));
        let connector = connector_for(voice.clone());

        for title in ["a", "broken", "c"] {
            controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
        }
        voice.finish_current().await;

        assert_eq!(voice.started_titles(), vec!["a", "c"]);
        let snapshot = controller.snapshot(guild()).await;
        assert_eq!(snapshot.now_playing.map(|t| t.title().to_string()), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_side_effects() {
        let registry = Arc::new(SessionRegistry::new(SessionSettings {
            capacity: 1,
            ..SessionSettings::default()
        }));
        let controller = PlaybackController::new(registry, quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());

        controller.enqueue_or_start(guild(), track("playing"), &connector).await.unwrap();
        controller.enqueue_or_start(guild(), track("queued"), &connector).await.unwrap();
        let result = controller.enqueue_or_start(guild(), track("overflow"), &connector).await;

        assert_eq!(result, Err(MusicError::CapacityExceeded { capacity: 1 }));
        assert_eq!(controller.snapshot(guild()).await.upcoming, vec![(1, "queued".to_string())]);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_session_idle() {
        let controller = controller_with(quiet_announcer());
        let mut connector = MockVoiceConnector::new();
        connector
            .expect_connect()
            .returning(|_| Err(MusicError::Voice("no channel".to_string())));

        let result = controller.enqueue_or_start(guild(), track("a"), &connector).await;

        assert_eq!(result, Err(MusicError::Voice("no channel".to_string())));
        assert!(controller.snapshot(guild()).await.now_playing.is_none());
    }

    #[tokio::test]
    async fn test_volume_bounds() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();

        assert_eq!(controller.set_volume(guild(), 150.0).await, Ok(()));
        assert_eq!(
            controller.set_volume(guild(), 201.0).await,
            Err(MusicError::OutOfRange { value: 201.0 })
        );
        assert_eq!(
            controller.set_volume(guild(), -1.0).await,
            Err(MusicError::OutOfRange { value: -1.0 })
        );
        assert_eq!(controller.snapshot(guild()).await.volume_percent.round(), 150.0);
        assert_eq!(*voice.volume.lock(), Some(1.5));

        assert_eq!(controller.set_volume(guild(), 0.0).await, Ok(()));
        assert_eq!(controller.set_volume(guild(), 200.0).await, Ok(()));
        assert_eq!(*voice.volume.lock(), Some(2.0));
    }

    #[tokio::test]
    async fn test_volume_is_stored_while_idle() {
        let controller = controller_with(quiet_announcer());
        controller.set_volume(guild(), 50.0).await.unwrap();

        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();

        assert_eq!(voice.started.lock()[0].1, 0.5);
    }

    #[tokio::test]
    async fn test_toggle_pause() {
        let controller = controller_with(quiet_announcer());
        assert_eq!(controller.toggle_pause(guild()).await, Ok(PauseToggle::Idle));

        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();

        assert_eq!(controller.toggle_pause(guild()).await, Ok(PauseToggle::Paused));
        assert!(*voice.paused.lock());
        assert_eq!(controller.toggle_pause(guild()).await, Ok(PauseToggle::Resumed));
        assert!(!*voice.paused.lock());
    }

    #[tokio::test]
    async fn test_skip_requires_voice_and_stops_current() {
        let controller = controller_with(quiet_announcer());
        assert_eq!(controller.skip(guild(), 1).await, Err(MusicError::VoiceNotConnected));

        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        for title in ["a", "b", "c", "d"] {
            controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
        }

        assert!(matches!(controller.skip(guild(), 0).await, Err(MusicError::InvalidArgument(_))));
        assert_eq!(controller.skip(guild(), 2).await, Ok(2));
        assert_eq!(*voice.stops.lock(), 1);

        voice.finish_current().await;
        assert_eq!(voice.started_titles(), vec!["a", "c"]);
        assert_eq!(controller.snapshot(guild()).await.history, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_jump_to_plays_the_match_next() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        for title in ["Intro", "Bohemian Rhapsody", "Stairway to Heaven", "Hotel California"] {
            controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
        }

        let target = controller.jump_to(guild(), "stairway").await.unwrap();
        assert_eq!(target.title(), "Stairway to Heaven");
        voice.finish_current().await;

        assert_eq!(voice.started_titles(), vec!["Intro", "Stairway to Heaven"]);
        assert_eq!(
            controller.snapshot(guild()).await.upcoming,
            vec![(1, "Hotel California".to_string())]
        );
    }

    #[tokio::test]
    async fn test_remove_and_shuffle() {
        let controller = controller_with(quiet_announcer());
        assert_eq!(controller.shuffle(guild()).await, Err(MusicError::QueueEmpty));

        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        for title in ["Intro", "Yellow Submarine", "Let It Be"] {
            controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
        }

        let removed = controller.remove(guild(), "submarine").await.unwrap();
        assert_eq!(removed.title(), "Yellow Submarine");
        assert_eq!(controller.shuffle(guild()).await, Ok(()));
        assert_eq!(controller.snapshot(guild()).await.upcoming, vec![(1, "Let It Be".to_string())]);
    }

    #[tokio::test]
    async fn test_lost_connection_drops_voice_and_ignores_late_completion() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();
        controller.enqueue_or_start(guild(), track("b"), &connector).await.unwrap();

        controller.handle_disconnect(guild()).await;
        voice.finish_current().await;

        let snapshot = controller.snapshot(guild()).await;
        assert!(snapshot.now_playing.is_none());
        assert_eq!(snapshot.upcoming, vec![(1, "b".to_string())]);
        assert_eq!(voice.started_titles(), vec!["a"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_completion_racing_stop_never_resurrects_playback() {
        for _ in 0..20 {
            let controller = controller_with(quiet_announcer());
            let voice = Arc::new(FakeVoice::default());
            let connector = connector_for(voice.clone());
            for title in ["a", "b", "c"] {
                controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
            }
            let notifier = voice.last_notifier();

            let completion = tokio::spawn(async move { notifier.notify(None).await });
            controller.stop(guild()).await.unwrap();
            completion.await.unwrap();

            let snapshot = controller.snapshot(guild()).await;
            assert!(snapshot.now_playing.is_none());
            assert!(snapshot.upcoming.is_empty());
        }
    }

    #[tokio::test]
    async fn test_reconnect_plays_leftover_queue_before_new_track() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();
        controller.enqueue_or_start(guild(), track("b"), &connector).await.unwrap();

        controller.handle_disconnect(guild()).await;
        let outcome = controller.enqueue_or_start(guild(), track("c"), &connector).await;

        assert_eq!(outcome, Ok(Enqueued::Queued { position: 1 }));
        assert_eq!(voice.started_titles(), vec!["a", "b"]);
        assert_eq!(controller.snapshot(guild()).await.upcoming, vec![(1, "c".to_string())]);

        voice.finish_current().await;
        assert_eq!(voice.started_titles(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stop_resets_before_disconnect_completes() {
        let controller = controller_with(quiet_announcer());
        let gate = Arc::new(Notify::new());
        let voice = Arc::new(FakeVoice {
            disconnect_gate: Some(gate.clone()),
            ..FakeVoice::default()
        });
        let connector = connector_for(voice.clone());
        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();
        controller.enqueue_or_start(guild(), track("b"), &connector).await.unwrap();

        let stopping = tokio::spawn({
            let controller = controller.clone();
            async move { controller.stop(guild()).await }
        });
        while *voice.disconnects.lock() == 0 {
            tokio::task::yield_now().await;
        }

        let snapshot = controller.snapshot(guild()).await;
        assert!(snapshot.now_playing.is_none());
        assert!(snapshot.upcoming.is_empty());
        assert!(snapshot.history.is_empty());

        gate.notify_one();
        assert_eq!(stopping.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_failed_stop_leaves_queue_untouched() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice {
            fail_stop: true,
            ..FakeVoice::default()
        });
        let connector = connector_for(voice.clone());
        for title in ["a", "b", "c", "Hotel California"] {
            controller.enqueue_or_start(guild(), track(title), &connector).await.unwrap();
        }

        assert!(matches!(controller.skip(guild(), 3).await, Err(MusicError::Voice(_))));
        assert!(matches!(controller.jump_to(guild(), "hotel").await, Err(MusicError::Voice(_))));

        let snapshot = controller.snapshot(guild()).await;
        assert_eq!(
            snapshot.upcoming,
            vec![
                (1, "b".to_string()),
                (2, "c".to_string()),
                (3, "Hotel California".to_string()),
            ]
        );
        assert_eq!(snapshot.history, vec!["a"]);
    }

    #[tokio::test]
    async fn test_snapshot_sums_queued_durations() {
        let controller = controller_with(quiet_announcer());
        let voice = Arc::new(FakeVoice::default());
        let connector = connector_for(voice.clone());
        controller.enqueue_or_start(guild(), track("a"), &connector).await.unwrap();
        for (title, secs) in [("b", 200), ("c", 40)] {
            let queued = track(title).with_duration(Duration::from_secs(secs));
            controller.enqueue_or_start(guild(), queued, &connector).await.unwrap();
        }

        assert_eq!(controller.snapshot(guild()).await.queued_duration, Duration::from_secs(240));
    }
}
