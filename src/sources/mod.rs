pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;

use crate::{audio::track::Track, error::Result};

pub use ytdlp::YtDlpResolver;

/// Turns a URL or a search phrase into a playable [`Track`].
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Failures come back as [`MusicError::Resolution`](crate::error::MusicError::Resolution)
    /// and are never retried.
    async fn resolve(&self, query: &str, requester: UserId) -> Result<Track>;
}
