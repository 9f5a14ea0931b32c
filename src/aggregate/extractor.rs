//! Session transition extraction
//!
//! Turns one ordered batch of listening events into per-edge weight deltas,
//! running one small state machine per active session. Order matters:
//! a transition is only visible as "previous track, then this track".

use crate::graph::{DeltaMap, EdgeKey, Event, EventType, SessionState};
use std::collections::HashMap;
use tracing::warn;

/// A skip this early into a track reads as rejection, not completion
pub const QUICK_SKIP_THRESHOLD_MS: i64 = 5000;

/// Weight of an ordinary in-session transition (play after play)
pub const NORMAL_TRANSITION_WEIGHT: f64 = 1.0;

/// Weight when the listener explicitly asked the radio for the next track
pub const RADIO_NEXT_WEIGHT: f64 = 2.0;

/// Penalty on the transition out of a quickly-skipped track
pub const QUICK_SKIP_PENALTY: f64 = -0.5;

/// What one batch extraction produced
#[derive(Debug, Default)]
pub struct ExtractedBatch {
    /// Accumulated per-edge deltas
    pub deltas: DeltaMap,
    /// Final state of every session touched by the batch
    pub session_states: HashMap<String, SessionState>,
    /// Events dropped for missing a session or track id
    pub invalid_events: usize,
}

/// Folds ordered events into edge deltas, one `SessionState` per session
///
/// States are created lazily on the first event of a session; seeding with
/// carryover states lets a session that straddles a batch boundary keep its
/// previous-track context.
#[derive(Debug, Default)]
pub struct TransitionExtractor {
    sessions: HashMap<String, SessionState>,
}

impl TransitionExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with persisted session states from earlier batches
    pub fn with_carryover(sessions: HashMap<String, SessionState>) -> Self {
        Self { sessions }
    }

    /// Process one ordered batch of events
    pub fn extract(mut self, events: &[Event]) -> ExtractedBatch {
        let mut deltas = DeltaMap::new();
        let mut invalid_events = 0;

        for event in events {
            if !event.is_attributable() {
                warn!(
                    event_id = %event.id,
                    sequence = event.sequence,
                    "skipping event with missing session or track id"
                );
                invalid_events += 1;
                continue;
            }

            match &event.event_type {
                EventType::PlayStart | EventType::Play10s | EventType::RadioNext => {
                    let state = self
                        .sessions
                        .entry(event.session_id.clone())
                        .or_insert_with(SessionState::new);

                    if let Some(prev) = &state.prev_track {
                        // Never an edge from a track to itself
                        if prev != &event.track {
                            let magnitude = if state.skipped_prev {
                                // Penalty dominates regardless of event type
                                QUICK_SKIP_PENALTY
                            } else if event.event_type == EventType::RadioNext {
                                RADIO_NEXT_WEIGHT
                            } else {
                                NORMAL_TRANSITION_WEIGHT
                            };
                            deltas.add(EdgeKey::new(prev.clone(), event.track.clone()), magnitude);
                        }
                    }

                    state.prev_track = Some(event.track.clone());
                    state.skipped_prev = false;
                    state.last_seen = Some(event.timestamp);
                }
                EventType::Skip => {
                    let state = self
                        .sessions
                        .entry(event.session_id.clone())
                        .or_insert_with(SessionState::new);

                    // The skipped track is already prev_track from its own
                    // play_start; a slow skip is natural and changes nothing.
                    if event.meta.elapsed_ms() < QUICK_SKIP_THRESHOLD_MS {
                        state.skipped_prev = true;
                    }
                    state.last_seen = Some(event.timestamp);
                }
                // Reserved for future weighting
                EventType::Like => {}
                // Unrecognized instrumentation kinds are ignored, not errors
                EventType::Other(_) => {}
            }
        }

        ExtractedBatch {
            deltas,
            session_states: self.sessions,
            invalid_events,
        }
    }
}
