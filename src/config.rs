use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::session::SessionSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub match_threshold: f64,

    // Tools
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            discord_token: std::env::var("DISCORD_TOKEN")?,
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.1".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            match_threshold: std::env::var("MATCH_THRESHOLD")
                .unwrap_or_else(|_| "0.8".to_string())
                .parse()?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size must be greater than 0
    /// - Match threshold must be in (0, 1]
    /// - Command prefix must not be empty
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            anyhow::bail!(
                "Match threshold must be in (0, 1], got: {}",
                self.match_threshold
            );
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        Ok(())
    }

    /// Defaults every guild session starts from.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            capacity: self.max_queue_size,
            default_volume: self.default_volume,
            match_threshold: self.match_threshold,
        }
    }

    /// Returns a summary of the current configuration for logging, without
    /// the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Commands: prefix '{}'\n  \
            Audio: {}% vol, {} queue, {} match threshold\n  \
            Tools: {}",
            self.command_prefix,
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            self.match_threshold,
            self.ytdlp_path,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            command_prefix: "!".to_string(),
            default_volume: 0.1,
            max_queue_size: 100,
            match_threshold: 0.8,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
