//! Candidate ranking over the gravity graph

mod ranker;

pub use ranker::{
    score_candidates, Neighbor, RankedCandidate, Ranker, EMBEDDING_WEIGHT, GRAVITY_WEIGHT,
    REPEAT_PENALTY,
};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the ranker
///
/// A failed graph read is the caller's problem: the ranker never falls back
/// to an unranked or arbitrarily-ordered result.
#[derive(Debug, Error)]
pub enum RankError {
    #[error("Gravity graph unavailable: {0}")]
    DependencyUnavailable(#[source] StorageError),
}

/// Result type for ranking operations
pub type RankResult<T> = Result<T, RankError>;
