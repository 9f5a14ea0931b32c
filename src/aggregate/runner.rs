//! The recurring aggregation job
//!
//! Poll for new events past the checkpoint, extract, merge, sleep, repeat.
//! A failed batch leaves the checkpoint where it was and is retried wholesale
//! on the next tick.

use super::extractor::TransitionExtractor;
use super::merger::BatchMerger;
use super::{AggregateError, AggregateResult};
use crate::storage::{EventLog, GravityStore};
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tuning for the aggregation loop
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum events consumed per batch
    pub batch_size: usize,
    /// Sleep between polls in loop mode
    pub poll_interval: std::time::Duration,
    /// Sessions idle longer than this lose their carryover state
    pub session_ttl: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            poll_interval: std::time::Duration::from_secs(30),
            session_ttl: Duration::hours(24),
        }
    }
}

/// The incremental aggregator: event log in, gravity graph out
pub struct Aggregator {
    log: Arc<dyn EventLog>,
    store: Arc<dyn GravityStore>,
    merger: BatchMerger,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(log: Arc<dyn EventLog>, store: Arc<dyn GravityStore>) -> Self {
        Self::with_config(log, store, AggregatorConfig::default())
    }

    pub fn with_config(
        log: Arc<dyn EventLog>,
        store: Arc<dyn GravityStore>,
        config: AggregatorConfig,
    ) -> Self {
        let merger = BatchMerger::new(store.clone(), config.session_ttl);
        Self {
            log,
            store,
            merger,
            config,
        }
    }

    /// Process at most one batch. Returns the number of events consumed;
    /// zero means the log had nothing past the checkpoint.
    pub fn run_once(&self) -> AggregateResult<usize> {
        let checkpoint = self
            .store
            .checkpoint()
            .map_err(AggregateError::SourceUnavailable)?;

        let events = self
            .log
            .fetch_since(checkpoint.last_sequence, self.config.batch_size)
            .map_err(AggregateError::SourceUnavailable)?;

        let Some(last_event) = events.last().cloned() else {
            debug!(
                last_sequence = checkpoint.last_sequence,
                "no new events to process"
            );
            return Ok(0);
        };

        // Seed the extractor with persisted states for the sessions in this
        // batch so boundary-straddling transitions are not lost.
        let session_ids: Vec<String> = events
            .iter()
            .map(|e| e.session_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let carryover = self
            .store
            .session_states(&session_ids)
            .map_err(AggregateError::SourceUnavailable)?;

        let batch = TransitionExtractor::with_carryover(carryover).extract(&events);
        if batch.invalid_events > 0 {
            warn!(invalid = batch.invalid_events, "dropped malformed events");
        }

        let processed = events.len();
        info!(
            events = processed,
            edges = batch.deltas.len(),
            "extracted batch"
        );

        self.merger.commit(batch, &last_event)?;
        Ok(processed)
    }

    /// Drain the log: run batches until one comes back empty.
    /// Returns the total number of events processed.
    pub fn run_until_idle(&self) -> AggregateResult<usize> {
        let mut total = 0;
        loop {
            let processed = self.run_once()?;
            if processed == 0 {
                return Ok(total);
            }
            total += processed;
        }
    }

    /// Run forever: poll, process, sleep. Source and merge failures are
    /// logged and retried on the next tick, never fatal.
    pub async fn run(&self) {
        info!(
            batch_size = self.config.batch_size,
            poll_secs = self.config.poll_interval.as_secs(),
            "aggregator loop started"
        );
        loop {
            match self.run_once() {
                Ok(0) => {}
                Ok(n) => {
                    debug!(events = n, "batch processed");
                    // More may be waiting; skip the sleep while catching up
                    continue;
                }
                Err(e) => warn!(error = %e, "batch aborted; will retry"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
