//! Per-guild music sessions for a Discord bot: queueing, fuzzy title search
//! and a play / complete / play-next loop over songbird.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod ui;
