//! In-memory gravity store
//!
//! Backs unit tests and embedding hosts that do not want a database file.
//! Honors the same commit contract as the SQLite store: the checkpoint
//! compare-and-swap gates the whole commit.

use super::traits::{BatchCommit, GravityStore, MergeOutcome, StorageResult};
use crate::graph::{Checkpoint, Edge, EdgeKey, SessionState, TrackId};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;

/// DashMap-backed gravity store
#[derive(Debug, Default)]
pub struct MemoryStore {
    edges: DashMap<EdgeKey, f64>,
    sessions: DashMap<String, SessionState>,
    /// Commit gate: held for the whole commit so the CAS and the edge
    /// increments are observed as one unit.
    checkpoint: Mutex<Checkpoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an edge directly, bypassing the commit path (test setup)
    pub fn set_edge(&self, from: impl Into<TrackId>, to: impl Into<TrackId>, weight: f64) {
        self.edges.insert(EdgeKey::new(from, to), weight);
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl GravityStore for MemoryStore {
    fn outgoing_edges(&self, track: &TrackId) -> StorageResult<HashMap<TrackId, f64>> {
        let mut out = HashMap::new();
        for entry in self.edges.iter() {
            if &entry.key().from == track {
                out.insert(entry.key().to.clone(), *entry.value());
            }
        }
        Ok(out)
    }

    fn top_neighbors(&self, track: &TrackId, limit: usize) -> StorageResult<Vec<Edge>> {
        let mut neighbors: Vec<Edge> = self
            .outgoing_edges(track)?
            .into_iter()
            .map(|(to, weight)| Edge::new(track.clone(), to, weight))
            .collect();
        neighbors.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    fn checkpoint(&self) -> StorageResult<Checkpoint> {
        Ok(self.checkpoint.lock().unwrap().clone())
    }

    fn session_states(
        &self,
        session_ids: &[String],
    ) -> StorageResult<HashMap<String, SessionState>> {
        let mut out = HashMap::new();
        for sid in session_ids {
            if let Some(state) = self.sessions.get(sid) {
                out.insert(sid.clone(), state.clone());
            }
        }
        Ok(out)
    }

    fn merge_batch(&self, commit: &BatchCommit) -> StorageResult<MergeOutcome> {
        let mut checkpoint = self.checkpoint.lock().unwrap();
        if checkpoint.last_sequence >= commit.checkpoint.last_sequence {
            return Ok(MergeOutcome::AlreadyApplied);
        }

        for (key, delta) in commit.deltas.iter() {
            if delta == 0.0 {
                continue;
            }
            *self.edges.entry(key.clone()).or_insert(0.0) += delta;
        }

        for (sid, state) in &commit.session_states {
            self.sessions.insert(sid.clone(), state.clone());
        }

        if let Some(cutoff) = commit.evict_sessions_before {
            // A session without a last_seen reads as seen now, matching what
            // the SQLite store persists for it
            self.sessions
                .retain(|_, state| state.last_seen.unwrap_or_else(Utc::now) >= cutoff);
        }

        *checkpoint = commit.checkpoint.clone();
        Ok(MergeOutcome::Applied)
    }
}
