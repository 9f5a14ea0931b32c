//! Storage trait definitions

use crate::graph::{Checkpoint, DeltaMap, Edge, Event, SessionState, TrackId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of committing a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Deltas applied and checkpoint advanced
    Applied,
    /// The checkpoint had already moved past this batch; nothing was written
    AlreadyApplied,
}

/// Everything one batch commits as a single logical unit
///
/// Edge increments, the checkpoint advance, and session-state carryover stand
/// or fall together: applying the deltas without moving the checkpoint invites
/// double counting on the next poll, and moving the checkpoint without the
/// deltas loses transitions.
#[derive(Debug, Clone)]
pub struct BatchCommit {
    /// Accumulated edge weight deltas for the batch
    pub deltas: DeltaMap,
    /// Checkpoint of the last event in the batch
    pub checkpoint: Checkpoint,
    /// Final per-session states, persisted for the next batch
    pub session_states: HashMap<String, SessionState>,
    /// Sessions idle since before this instant are evicted
    pub evict_sessions_before: Option<DateTime<Utc>>,
}

/// The append-only behavioral event log
pub trait EventLog: Send + Sync {
    /// Append an event, returning its assigned log sequence
    fn append(&self, event: &Event) -> StorageResult<i64>;

    /// Fetch up to `limit` events with sequence strictly greater than
    /// `sequence`, ordered ascending
    fn fetch_since(&self, sequence: i64, limit: usize) -> StorageResult<Vec<Event>>;
}

/// Persistent store for the gravity graph, its checkpoint, and session
/// carryover state
///
/// Implementations must be thread-safe (Send + Sync). `merge_batch` must be
/// atomic: increments are applied as increment-or-insert (never a separate
/// read then write), and the checkpoint advance is a compare-and-swap gated
/// on the batch not having been applied — a batch replayed after a crash, or
/// raced by a second aggregator, reports `AlreadyApplied` and writes nothing.
pub trait GravityStore: Send + Sync {
    /// All outgoing edges of a track as `to_track -> weight`
    fn outgoing_edges(&self, track: &TrackId) -> StorageResult<HashMap<TrackId, f64>>;

    /// Top `limit` outgoing edges of a track, heaviest first
    fn top_neighbors(&self, track: &TrackId, limit: usize) -> StorageResult<Vec<Edge>>;

    /// Current aggregation checkpoint
    fn checkpoint(&self) -> StorageResult<Checkpoint>;

    /// Carryover states for the given sessions; absent sessions are omitted
    fn session_states(
        &self,
        session_ids: &[String],
    ) -> StorageResult<HashMap<String, SessionState>>;

    /// Commit one batch: deltas, checkpoint, and session carryover as one
    /// logical unit
    fn merge_batch(&self, commit: &BatchCommit) -> StorageResult<MergeOutcome>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
