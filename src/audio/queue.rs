use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::{fuzzy::longest_common_subsequence_len, track::Track};
use crate::error::{MusicError, Result};

pub const DEFAULT_CAPACITY: usize = 100;

/// Fraction of the query length a title's common subsequence must reach to
/// count as a match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;

/// Bounded FIFO of upcoming tracks plus the history of everything that
/// started playing or was skipped.
#[derive(Debug, Clone)]
pub struct PlaybackQueue {
    items: VecDeque<Track>,
    history: Vec<Track>,
    capacity: usize,
    match_threshold: f64,
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        Self::with_threshold(capacity, DEFAULT_MATCH_THRESHOLD)
    }

    pub fn with_threshold(capacity: usize, match_threshold: f64) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            history: Vec::new(),
            capacity,
            match_threshold,
        }
    }

    /// Appends a track to the tail of the queue.
    pub fn add_track(&mut self, track: Track) -> Result<()> {
        if self.items.len() >= self.capacity {
            return Err(MusicError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        info!("➕ Added to queue: {}", track.title());
        self.items.push_back(track);
        Ok(())
    }

    /// The track that will play next, if any.
    pub fn next_track(&self) -> Option<&Track> {
        self.items.front()
    }

    /// Removes the head of the queue and records it in the history.
    pub fn pop_track(&mut self) -> Result<Track> {
        let track = self.items.pop_front().ok_or(MusicError::QueueEmpty)?;
        debug!("➡️ Next in queue: {}", track.title());
        self.history.push(track.clone());
        Ok(track)
    }

    /// Records a track that started playing without passing through the queue.
    pub fn record_played(&mut self, track: Track) {
        self.history.push(track);
    }

    /// Drops up to `count` tracks from the head into the history.
    ///
    /// Skipping past the end empties the queue. Returns how many tracks were
    /// skipped.
    pub fn skip(&mut self, count: i64) -> Result<usize> {
        let count = usize::try_from(count).map_err(|_| {
            MusicError::InvalidArgument("number of songs to skip must be positive".to_string())
        })?;

        let skipped = count.min(self.items.len());
        self.history.extend(self.items.drain(..skipped));

        if skipped > 0 {
            info!("⏭️ Skipped {} songs", skipped);
        }
        Ok(skipped)
    }

    /// Skips every track up to and including the best match for `name`.
    pub fn skip_to(&mut self, name: &str) -> Result<usize> {
        let index = self.search_queue(name)?;
        self.skip(index as i64 + 1)
    }

    /// Removes the best match for `name` from the queue, keeping the order of
    /// the other tracks. The removed track does not go to the history.
    pub fn delete_track(&mut self, name: &str) -> Result<Track> {
        let index = self.search_queue(name)?;
        let track = self
            .items
            .remove(index)
            .ok_or_else(|| MusicError::NoMatchFound(name.to_string()))?;

        info!("❌ Removed from queue: {}", track.title());
        Ok(track)
    }

    /// Position (0-based) of the queued track whose title best matches `name`.
    pub fn search_queue(&self, name: &str) -> Result<usize> {
        if self.items.is_empty() {
            return Err(MusicError::QueueEmpty);
        }

        best_match(self.items.iter(), name, self.match_threshold)
            .ok_or_else(|| MusicError::NoMatchFound(name.to_string()))
    }

    /// Track in the history whose title best matches `name`.
    pub fn search_history(&self, name: &str) -> Result<&Track> {
        if self.history.is_empty() {
            return Err(MusicError::EmptyHistory);
        }

        best_match(self.history.iter(), name, self.match_threshold)
            .map(|index| &self.history[index])
            .ok_or_else(|| MusicError::NoMatchFound(name.to_string()))
    }

    /// Randomly reorders the upcoming tracks.
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Queue shuffled");
    }

    /// Upcoming tracks as `(position, title)`, positions starting at 1.
    pub fn queue_listing(&self) -> Vec<(usize, String)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, track)| (index + 1, track.title().to_string()))
            .collect()
    }

    /// Titles of the history, most recent first.
    pub fn history_listing(&self) -> Vec<String> {
        self.history
            .iter()
            .rev()
            .map(|track| track.title().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn history(&self) -> &[Track] {
        &self.history
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(Track::duration).sum()
    }
}

/// Index of the candidate with the longest common subsequence against the
/// query, provided it reaches `threshold * query length`. Ties keep the
/// earliest candidate.
fn best_match<'a>(
    candidates: impl Iterator<Item = &'a Track>,
    query: &str,
    threshold: f64,
) -> Option<usize> {
    let query = query.to_uppercase();
    let min_len = query.chars().count() as f64 * threshold;

    let mut best: Option<(usize, usize)> = None;
    for (index, track) in candidates.enumerate() {
        let subsequence = longest_common_subsequence_len(&track.title().to_uppercase(), &query);
        if subsequence == 0 || (subsequence as f64) < min_len {
            continue;
        }
        if best.map_or(true, |(_, longest)| subsequence > longest) {
            best = Some((index, subsequence));
        }
    }

    best.map(|(index, _)| index)
}
