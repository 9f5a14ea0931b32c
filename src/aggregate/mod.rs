//! The incremental gravity aggregator
//!
//! A recurring single-flow job: poll the event log past the checkpoint, fold
//! the batch into per-edge weight deltas with one state machine per session,
//! and commit deltas plus checkpoint as one unit. At-least-once at the batch
//! level, exactly-once at the edge-weight level.

mod extractor;
mod merger;
mod runner;

pub use extractor::{
    ExtractedBatch, TransitionExtractor, NORMAL_TRANSITION_WEIGHT, QUICK_SKIP_PENALTY,
    QUICK_SKIP_THRESHOLD_MS, RADIO_NEXT_WEIGHT,
};
pub use merger::BatchMerger;
pub use runner::{Aggregator, AggregatorConfig};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that abort a batch; the checkpoint stays put and the same batch is
/// re-read on the next poll
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Event log or checkpoint store unreachable
    #[error("Event source unavailable: {0}")]
    SourceUnavailable(#[source] StorageError),

    /// Merge or checkpoint write failed
    #[error("Batch merge failed: {0}")]
    MergeFailed(#[source] StorageError),
}

/// Result type for aggregator operations
pub type AggregateResult<T> = Result<T, AggregateError>;
