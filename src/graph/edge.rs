//! Edges of the gravity graph and the aggregation checkpoint

use super::track::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Directed pair of tracks, the unique key of an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub from: TrackId,
    pub to: TrackId,
}

impl EdgeKey {
    pub fn new(from: impl Into<TrackId>, to: impl Into<TrackId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// A weighted directed transition between two tracks
///
/// Weight is accumulated additively from observed transitions: positive for
/// normal and explicit radio transitions, negative for quick-skip penalties.
/// It is unbounded in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: TrackId,
    pub to: TrackId,
    pub weight: f64,
}

impl Edge {
    pub fn new(from: impl Into<TrackId>, to: impl Into<TrackId>, weight: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            weight,
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

/// Per-batch accumulated weight deltas, keyed by directed track pair
///
/// Deltas for the same pair are summed before touching the store, so a batch
/// costs one increment per distinct edge regardless of how many sessions
/// crossed it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaMap(HashMap<EdgeKey, f64>);

impl DeltaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta for the given pair, accumulating with any prior delta
    pub fn add(&mut self, key: EdgeKey, delta: f64) {
        *self.0.entry(key).or_insert(0.0) += delta;
    }

    pub fn get(&self, key: &EdgeKey) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EdgeKey, f64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }
}

impl IntoIterator for DeltaMap {
    type Item = (EdgeKey, f64);
    type IntoIter = std::collections::hash_map::IntoIter<EdgeKey, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(EdgeKey, f64)> for DeltaMap {
    fn from_iter<I: IntoIterator<Item = (EdgeKey, f64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.add(k, v);
        }
        map
    }
}

/// Durable marker of how far the event log has been folded into the graph
///
/// A single logical row, advanced only by the batch merger and only in the
/// same transaction as the edge increments it accounts for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Log sequence of the last processed event; 0 before any batch
    pub last_sequence: i64,
    /// Id of the last processed event, for operator forensics
    pub last_event_id: Option<String>,
    /// Timestamp of the last processed event
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// The checkpoint of a graph that has processed nothing
    pub fn origin() -> Self {
        Self {
            last_sequence: 0,
            last_event_id: None,
            last_timestamp: None,
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::origin()
    }
}
