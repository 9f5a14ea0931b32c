//! Batch commit orchestration
//!
//! Hands an extracted batch to the store as one logical unit and interprets
//! the compare-and-swap outcome.

use super::extractor::ExtractedBatch;
use super::{AggregateError, AggregateResult};
use crate::graph::{Checkpoint, Event};
use crate::storage::{BatchCommit, GravityStore, MergeOutcome};
use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

/// Commits extracted batches against a gravity store
pub struct BatchMerger {
    store: Arc<dyn GravityStore>,
    session_ttl: Duration,
}

impl BatchMerger {
    pub fn new(store: Arc<dyn GravityStore>, session_ttl: Duration) -> Self {
        Self { store, session_ttl }
    }

    /// Durably apply a batch's deltas and advance the checkpoint.
    ///
    /// `last_event` is the final event of the processed batch; its sequence,
    /// id, and timestamp become the new checkpoint. Session eviction is cut
    /// off relative to event time, not wall-clock time, so replaying an old
    /// log does not flush live sessions.
    pub fn commit(
        &self,
        batch: ExtractedBatch,
        last_event: &Event,
    ) -> AggregateResult<MergeOutcome> {
        let checkpoint = Checkpoint {
            last_sequence: last_event.sequence,
            last_event_id: Some(last_event.id.clone()),
            last_timestamp: Some(last_event.timestamp),
        };

        let commit = BatchCommit {
            deltas: batch.deltas,
            checkpoint,
            session_states: batch.session_states,
            evict_sessions_before: Some(last_event.timestamp - self.session_ttl),
        };

        let outcome = self
            .store
            .merge_batch(&commit)
            .map_err(AggregateError::MergeFailed)?;

        match outcome {
            MergeOutcome::Applied => {
                info!(
                    edges = commit.deltas.len(),
                    sessions = commit.session_states.len(),
                    last_sequence = commit.checkpoint.last_sequence,
                    "batch merged"
                );
            }
            MergeOutcome::AlreadyApplied => {
                warn!(
                    last_sequence = commit.checkpoint.last_sequence,
                    "batch already applied; nothing written"
                );
            }
        }

        Ok(outcome)
    }
}
