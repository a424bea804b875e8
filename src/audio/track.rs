use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

/// One playable item, as produced by a [`TrackResolver`](crate::sources::TrackResolver).
///
/// A track is never modified once it has been handed to a queue; the `with_*`
/// setters consume the value and are only meant for the resolver building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    source_url: String,
    stream_url: String,
    duration: Option<Duration>,
    thumbnail_url: Option<String>,
    requester: UserId,
    description: String,
    requested_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        source_url: impl Into<String>,
        stream_url: impl Into<String>,
        requester: UserId,
    ) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            stream_url: stream_url.into(),
            duration: None,
            thumbnail_url: None,
            requester,
            description: String::new(),
            requested_at: Utc::now(),
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn source_url(&self) -> &str {
        &self.source_url
    }
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
    pub fn requester(&self) -> UserId {
        self.requester
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    // Setters
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
