//! Gravitas: Listening-Gravity Engine
//!
//! Folds listening-session telemetry into a persistent weighted directed
//! graph of track-to-track transitions ("gravity") and ranks next-track
//! candidates by blending that graph with externally supplied
//! content-similarity scores.
//!
//! # Core Concepts
//!
//! - **Gravity graph**: weighted directed edges between tracks; weight grows
//!   with observed transitions and shrinks with quick skips
//! - **Aggregator**: checkpointed incremental job folding the event log into
//!   edge deltas, exactly-once at the edge-weight level
//! - **Ranker**: pure, deterministic blend of similarity and gravity
//!
//! # Example
//!
//! ```
//! use gravitas::{MemoryStore, Ranker, TrackId};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let ranker = Ranker::new(store);
//! let ranked = ranker
//!     .rank(&TrackId::from("a"), &[TrackId::from("b")], &HashMap::new(), &[])
//!     .unwrap();
//! assert_eq!(ranked.len(), 1);
//! ```

pub mod aggregate;
mod graph;
pub mod rank;
pub mod simulate;
pub mod storage;

pub use aggregate::{Aggregator, AggregatorConfig, AggregateError, BatchMerger, TransitionExtractor};
pub use graph::{Checkpoint, DeltaMap, Edge, EdgeKey, Event, EventMeta, EventType, SessionState, TrackId};
pub use rank::{RankError, RankedCandidate, Ranker};
pub use storage::{
    BatchCommit, EventLog, GravityStore, MemoryStore, MergeOutcome, OpenStore, SqliteStore,
    StorageError, StorageResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
