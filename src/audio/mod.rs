//! # Audio Module
//!
//! Per-guild music sessions: the queue, the session state and the controller
//! that moves from one track to the next.
//!
//! ## Architecture
//!
//! ### [`fuzzy`] - String Matching
//! - Optimal string alignment distance and longest common subsequence
//!
//! ### [`queue`] - Queue Management
//! - Bounded FIFO of upcoming tracks plus the play history
//! - Approximate title search used by skip-to and remove
//!
//! ### [`session`] - Guild State
//! - One [`GuildSession`] per guild behind its own async mutex
//! - [`SessionRegistry`] creates sessions on first use and never evicts them
//!
//! ### [`player`] - Playback Control
//! - Idle / Playing state machine driven by commands and completion events
//! - Stale completions (after `stop`, after a skip) are recognised by epoch
//!
//! ### [`voice`] and [`songbird_voice`] - Audio Transport
//! - Traits for the voice output, the voice connector and the announcer
//! - Songbird implementation streaming the resolved URL over HTTP
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use guild_jukebox::audio::{player::PlaybackController, session::SessionRegistry};
//! use serenity::all::GuildId;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     announcer: Arc<dyn guild_jukebox::audio::voice::Announcer>,
//! #     connector: &dyn guild_jukebox::audio::voice::VoiceConnector,
//! #     track: guild_jukebox::audio::track::Track,
//! # ) -> guild_jukebox::error::Result<()> {
//! let registry = Arc::new(SessionRegistry::default());
//! let controller = PlaybackController::new(registry, announcer);
//! let guild_id = GuildId::new(123456789);
//!
//! controller.enqueue_or_start(guild_id, track, connector).await?;
//! controller.set_volume(guild_id, 80.0).await?;
//! controller.toggle_pause(guild_id).await?;
//! controller.stop(guild_id).await?;
//! # Ok(())
//! # }
//! ```

pub mod fuzzy;
pub mod player;
pub mod queue;
pub mod session;
pub mod songbird_voice;
pub mod track;
pub mod voice;

pub use player::{CompletionNotifier, Enqueued, PauseToggle, PlaybackController, SessionSnapshot};
pub use queue::PlaybackQueue;
pub use session::{GuildSession, SessionRegistry, SessionSettings};
pub use track::Track;
