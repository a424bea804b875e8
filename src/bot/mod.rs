//! # Bot Module
//!
//! Discord side of the jukebox: reads prefix commands from guild text
//! channels, hands them to the [`PlaybackController`] and reports the outcome
//! back to the channel.
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]:
//!
//! - `message`: parses the content with [`Command::parse`] and dispatches it
//!   through [`handlers::handle_command`]
//! - `voice_state_update`: notices when the bot was dropped from voice and
//!   forgets the dead connection
//!
//! ## Example
//!
//! ```rust,no_run
//! use guild_jukebox::{bot::JukeboxBot, config::Config};
//! use serenity::all::Http;
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let http = Arc::new(Http::new(&config.discord_token));
//! let bot = JukeboxBot::new(config, http);
//! # Ok(())
//! # }
//! ```

use serenity::{
    all::{Context, EventHandler, Http, Message, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{player::PlaybackController, session::SessionRegistry},
    config::Config,
    error::MusicError,
    sources::{TrackResolver, YtDlpResolver},
    ui::embeds::{self, ChannelAnnouncer},
};
use commands::Command;

/// Serenity event handler owning everything a command needs.
pub struct JukeboxBot {
    config: Arc<Config>,
    pub controller: PlaybackController,
    pub announcer: Arc<ChannelAnnouncer>,
    pub resolver: Arc<dyn TrackResolver>,
    /// Shared by every songbird HTTP stream
    pub http_client: reqwest::Client,
}

impl JukeboxBot {
    /// `http` is used for announcements, which may fire from songbird's event
    /// tasks long after the triggering message was handled.
    pub fn new(config: Config, http: Arc<Http>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.session_settings()));
        let announcer = Arc::new(ChannelAnnouncer::new(http));
        let resolver: Arc<dyn TrackResolver> = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));

        Self {
            controller: PlaybackController::new(registry, announcer.clone()),
            announcer,
            resolver,
            http_client: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }
}

/// User-facing text for a failed command.
fn describe_error(e: &anyhow::Error) -> String {
    match e.downcast_ref::<MusicError>() {
        Some(MusicError::VoiceNotConnected) => "Nothing is playing right now.".to_string(),
        Some(music_error) => format!("❌ {}", music_error),
        None => "❌ Something went wrong, try again later.".to_string(),
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} guilds", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let result = match Command::parse(&self.config.command_prefix, &msg.content) {
            Ok(Some(command)) => {
                handlers::handle_command(&ctx, &msg, guild_id, command, self).await
            }
            Ok(None) => return,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            match e.downcast_ref::<MusicError>() {
                Some(_) => info!("🚫 Command rejected in guild {}: {}", guild_id, e),
                None => error!("Error handling command in guild {}: {:?}", guild_id, e),
            }

            let embed = embeds::error_embed(describe_error(&e));
            if let Err(e) = handlers::send_embed(&ctx, msg.channel_id, embed).await {
                warn!("⚠️ Couldn't report error to channel {}: {:?}", msg.channel_id, e);
            }
        }
    }

    /// Forgets the voice connection when the bot is kicked or its channel is
    /// deleted. Leaving on purpose also lands here and is a no-op by then.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() || old.is_none() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot disconnected from voice in guild {}", guild_id);
            self.controller.handle_disconnect(guild_id).await;
        }
    }
}
