//! Per-session transition context

use super::track::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The transition context of one listening session
///
/// Invariant: `skipped_prev` is true only while `prev_track` is a track that
/// was played and quickly abandoned; it is cleared the moment the next
/// transition involving that track is emitted.
///
/// Held in memory while a batch is processed and persisted alongside the
/// checkpoint so a session that straddles a batch boundary keeps its context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Most recently played track in this session
    pub prev_track: Option<TrackId>,
    /// Whether `prev_track` was quickly skipped
    pub skipped_prev: bool,
    /// When this session last produced an event; drives TTL eviction
    pub last_seen: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}
