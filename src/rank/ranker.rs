//! Blended next-track scoring
//!
//! `score_candidates` is a pure function over a snapshot of a track's
//! outgoing edges; `Ranker` binds it to a store. Identical inputs always
//! produce identical scores and ordering.

use super::{RankError, RankResult};
use crate::graph::TrackId;
use crate::storage::GravityStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Share of the final score carried by content similarity
pub const EMBEDDING_WEIGHT: f64 = 0.7;

/// Share of the final score carried by normalized gravity
pub const GRAVITY_WEIGHT: f64 = 0.3;

/// Flat penalty for a candidate already played this session
pub const REPEAT_PENALTY: f64 = 1.0;

/// One scored candidate, with its score components for explainability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub track_id: TrackId,
    /// Blended final score the ordering is based on
    pub score: f64,
    /// Content-similarity input, 0.0 when not supplied
    pub embedding_score: f64,
    /// Gravity normalized against the strongest outgoing edge
    pub gravity_score: f64,
    /// Unnormalized edge weight from the current track
    pub raw_gravity: f64,
}

/// An outgoing neighbor of a track, weight-normalized for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub track_id: TrackId,
    pub weight: f64,
    pub normalized_score: f64,
}

/// Score and order candidates against a snapshot of outgoing edges.
///
/// `score = 0.7 * embedding + 0.3 * normalized_gravity - repeat_penalty`
///
/// Gravity is normalized against the heaviest outgoing edge; when the best
/// available signal is non-positive, normalization is suppressed entirely so
/// an all-penalized neighborhood cannot produce misleadingly large scores.
/// The sort is stable and descending: ties keep the caller's candidate order.
pub fn score_candidates(
    candidates: &[TrackId],
    similarity_scores: &HashMap<TrackId, f64>,
    session_history: &[TrackId],
    edges: &HashMap<TrackId, f64>,
) -> Vec<RankedCandidate> {
    let max_weight = edges.values().copied().fold(0.0_f64, f64::max);

    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|candidate| {
            let embedding_score = similarity_scores.get(candidate).copied().unwrap_or(0.0);
            let raw_gravity = edges.get(candidate).copied().unwrap_or(0.0);
            let gravity_score = if max_weight > 0.0 {
                raw_gravity / max_weight
            } else {
                0.0
            };
            let repeat_penalty = if session_history.contains(candidate) {
                REPEAT_PENALTY
            } else {
                0.0
            };

            RankedCandidate {
                track_id: candidate.clone(),
                score: EMBEDDING_WEIGHT * embedding_score + GRAVITY_WEIGHT * gravity_score
                    - repeat_penalty,
                embedding_score,
                gravity_score,
                raw_gravity,
            }
        })
        .collect();

    // Stable sort: equal scores preserve candidate input order
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Store-backed ranking entry point
///
/// Holds no mutable state; safe to share across concurrent requests. Each
/// call performs exactly one edge read against the store.
pub struct Ranker {
    store: Arc<dyn GravityStore>,
}

impl Ranker {
    pub fn new(store: Arc<dyn GravityStore>) -> Self {
        Self { store }
    }

    /// Rank candidate next tracks for `current_track`.
    ///
    /// Missing similarity scores and missing edges default to 0.0; a failed
    /// graph read surfaces as an error.
    pub fn rank(
        &self,
        current_track: &TrackId,
        candidates: &[TrackId],
        similarity_scores: &HashMap<TrackId, f64>,
        session_history: &[TrackId],
    ) -> RankResult<Vec<RankedCandidate>> {
        let edges = self
            .store
            .outgoing_edges(current_track)
            .map_err(RankError::DependencyUnavailable)?;

        debug!(
            current = %current_track,
            candidates = candidates.len(),
            edges = edges.len(),
            "ranking candidates"
        );

        Ok(score_candidates(
            candidates,
            similarity_scores,
            session_history,
            &edges,
        ))
    }

    /// Top outgoing neighbors of a track, normalized against the heaviest
    /// edge, for explainability and debugging
    pub fn neighbors(&self, track: &TrackId, limit: usize) -> RankResult<Vec<Neighbor>> {
        let edges = self
            .store
            .top_neighbors(track, limit)
            .map_err(RankError::DependencyUnavailable)?;

        let max_weight = edges
            .iter()
            .map(|e| e.weight)
            .fold(0.0_f64, f64::max);

        Ok(edges
            .into_iter()
            .map(|edge| Neighbor {
                track_id: edge.to,
                normalized_score: if max_weight > 0.0 {
                    edge.weight / max_weight
                } else {
                    0.0
                },
                weight: edge.weight,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::storage::{BatchCommit, MemoryStore, MergeOutcome, StorageError, StorageResult};

    /// A store whose graph reads always fail, as if the database were gone
    struct UnreachableStore;

    impl UnreachableStore {
        fn unreachable() -> StorageError {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "graph store unreachable",
            ))
        }
    }

    impl GravityStore for UnreachableStore {
        fn outgoing_edges(&self, _: &TrackId) -> StorageResult<HashMap<TrackId, f64>> {
            Err(Self::unreachable())
        }

        fn top_neighbors(&self, _: &TrackId, _: usize) -> StorageResult<Vec<Edge>> {
            Err(Self::unreachable())
        }

        fn checkpoint(&self) -> StorageResult<crate::graph::Checkpoint> {
            Err(Self::unreachable())
        }

        fn session_states(
            &self,
            _: &[String],
        ) -> StorageResult<HashMap<String, crate::graph::SessionState>> {
            Err(Self::unreachable())
        }

        fn merge_batch(&self, _: &BatchCommit) -> StorageResult<MergeOutcome> {
            Err(Self::unreachable())
        }
    }

    fn ids(names: &[&str]) -> Vec<TrackId> {
        names.iter().map(|n| TrackId::from(*n)).collect()
    }

    fn scores(pairs: &[(&str, f64)]) -> HashMap<TrackId, f64> {
        pairs
            .iter()
            .map(|(n, s)| (TrackId::from(*n), *s))
            .collect()
    }

    fn scenario_store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.set_edge("a", "b", 4.0);
        store.set_edge("a", "c", 1.0);
        Arc::new(store)
    }

    #[test]
    fn blends_embedding_and_normalized_gravity() {
        let ranker = Ranker::new(scenario_store());
        let ranked = ranker
            .rank(
                &TrackId::from("a"),
                &ids(&["b", "c", "d"]),
                &scores(&[("b", 0.5), ("c", 0.9)]),
                &[],
            )
            .unwrap();

        let order: Vec<&str> = ranked.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "d"]);

        // b: 0.7*0.5 + 0.3*(4/4) = 0.65
        assert!((ranked[1].score - 0.65).abs() < 1e-12);
        assert_eq!(ranked[1].raw_gravity, 4.0);
        assert_eq!(ranked[1].gravity_score, 1.0);
        // c: 0.7*0.9 + 0.3*(1/4) = 0.705
        assert!((ranked[0].score - 0.705).abs() < 1e-12);
        assert_eq!(ranked[0].gravity_score, 0.25);
        // d: no similarity, no edge
        assert_eq!(ranked[2].score, 0.0);
    }

    #[test]
    fn repeat_penalty_pushes_history_to_the_back() {
        let ranker = Ranker::new(scenario_store());
        let ranked = ranker
            .rank(
                &TrackId::from("a"),
                &ids(&["b", "c", "d"]),
                &scores(&[("b", 0.5), ("c", 0.9)]),
                &ids(&["c"]),
            )
            .unwrap();

        let order: Vec<&str> = ranked.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(order, vec!["b", "d", "c"]);
        assert!((ranked[2].score - (0.705 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn non_positive_max_weight_suppresses_normalization() {
        // No outgoing edges at all
        let empty = HashMap::new();
        let ranked = score_candidates(&ids(&["x", "y"]), &HashMap::new(), &[], &empty);
        assert!(ranked.iter().all(|r| r.gravity_score == 0.0));

        // All edges penalized into the negative
        let mut penalized = HashMap::new();
        penalized.insert(TrackId::from("x"), -2.0);
        penalized.insert(TrackId::from("y"), -0.5);
        let ranked = score_candidates(&ids(&["x", "y"]), &HashMap::new(), &[], &penalized);
        assert!(ranked.iter().all(|r| r.gravity_score == 0.0));
        assert_eq!(ranked[0].raw_gravity, -2.0);
    }

    #[test]
    fn ties_preserve_candidate_input_order() {
        let ranked = score_candidates(
            &ids(&["m", "n", "o"]),
            &HashMap::new(),
            &[],
            &HashMap::new(),
        );
        let order: Vec<&str> = ranked.iter().map(|r| r.track_id.as_str()).collect();
        assert_eq!(order, vec!["m", "n", "o"]);
    }

    #[test]
    fn identical_inputs_rank_identically() {
        let candidates = ids(&["b", "c", "d"]);
        let sims = scores(&[("b", 0.5), ("c", 0.9)]);
        let mut edges = HashMap::new();
        edges.insert(TrackId::from("b"), 4.0);
        edges.insert(TrackId::from("c"), 1.0);

        let first = score_candidates(&candidates, &sims, &[], &edges);
        let second = score_candidates(&candidates, &sims, &[], &edges);
        assert_eq!(first, second);
    }

    #[test]
    fn neighbors_normalize_against_the_heaviest_edge() {
        let ranker = Ranker::new(scenario_store());
        let neighbors = ranker.neighbors(&TrackId::from("a"), 10).unwrap();

        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].track_id.as_str(), "b");
        assert_eq!(neighbors[0].normalized_score, 1.0);
        assert_eq!(neighbors[1].normalized_score, 0.25);
    }

    #[test]
    fn failed_graph_read_surfaces_as_an_error_not_a_fallback_ranking() {
        let ranker = Ranker::new(Arc::new(UnreachableStore));

        let result = ranker.rank(
            &TrackId::from("a"),
            &ids(&["b", "c"]),
            &scores(&[("b", 0.5)]),
            &[],
        );
        assert!(matches!(
            result,
            Err(RankError::DependencyUnavailable(_))
        ));

        let result = ranker.neighbors(&TrackId::from("a"), 10);
        assert!(matches!(
            result,
            Err(RankError::DependencyUnavailable(_))
        ));
    }

    #[test]
    fn neighbors_of_an_unknown_track_are_empty() {
        let ranker = Ranker::new(Arc::new(MemoryStore::new()));
        assert!(ranker.neighbors(&TrackId::from("nowhere"), 5).unwrap().is_empty());
    }
}
