//! Deterministic ranking and stateful batching of filtered alternatives.

use crate::domain::alternative::Alternative;
use crate::domain::recommendation::RecommendationState;

/// Batch size is fixed for the lifetime of one conversation. Changing it
/// mid-conversation would desynchronize the recommended-count cursor and is
/// unsupported.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Sort candidates by descending `rank_score`, then descending
/// `available_quantity` (unknown quantity sorts last). The sort is stable:
/// exact key ties keep their input order, so equal inputs always produce
/// equal rankings.
pub fn rank(mut candidates: Vec<Alternative>) -> Vec<Alternative> {
    candidates.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| b.available_quantity.cmp(&a.available_quantity))
    });
    candidates
}

/// Outcome of asking for the next batch of a conversation's ranked
/// alternatives.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchOutcome {
    /// The next `alternatives` to show, and the cursor value to commit once
    /// they were actually delivered.
    Batch { alternatives: Vec<Alternative>, next_count: usize },
    /// Every ranked alternative has already been shown.
    Exhausted,
}

/// Read the next batch without mutating state. The caller commits
/// `next_count` (via the state store) only after the batch was successfully
/// delivered to the customer; retrying with an uncommitted cursor yields the
/// identical batch, so no product is ever skipped or repeated.
pub fn next_batch(state: &RecommendationState, batch_size: usize) -> BatchOutcome {
    let ranked = state.ranked_alternatives();
    let start = state.recommended_count().min(ranked.len());
    let end = start.saturating_add(batch_size).min(ranked.len());
    if start >= end {
        return BatchOutcome::Exhausted;
    }
    BatchOutcome::Batch { alternatives: ranked[start..end].to_vec(), next_count: end }
}
