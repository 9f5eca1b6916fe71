//! Relevance filtering of candidate substitutes.
//!
//! Two interchangeable policies share the [`RelevanceFilter`] contract: the
//! deterministic token heuristic below, and the delegated LLM classification
//! in `restock-agent`. Both return an order-preserving subsequence of the
//! input. Which one serves a deployment is a configuration choice.

use async_trait::async_trait;

use crate::domain::alternative::Alternative;

#[async_trait]
pub trait RelevanceFilter: Send + Sync {
    /// Reduce `candidates` to those plausibly substitutable for
    /// `original_product`, preserving input order.
    async fn filter(
        &self,
        original_product: &str,
        candidates: Vec<Alternative>,
    ) -> Vec<Alternative>;
}

/// Deterministic, offline relevance policy.
///
/// A candidate passes when its first name token equals the original
/// product's first name token, or when that token appears among the
/// candidate's ingredients. Fail-closed: zero matches yield an empty result,
/// and the caller decides what "no relevant alternatives" means.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenHeuristicFilter;

impl TokenHeuristicFilter {
    fn is_relevant(main_token: &str, candidate: &Alternative) -> bool {
        if main_token.is_empty() {
            return false;
        }
        if first_token(&candidate.product_name) == main_token {
            return true;
        }
        candidate.ingredients.iter().any(|ingredient| ingredient.to_lowercase() == main_token)
    }
}

#[async_trait]
impl RelevanceFilter for TokenHeuristicFilter {
    async fn filter(
        &self,
        original_product: &str,
        candidates: Vec<Alternative>,
    ) -> Vec<Alternative> {
        let main_token = first_token(original_product);
        candidates
            .into_iter()
            .filter(|candidate| Self::is_relevant(&main_token, candidate))
            .collect()
    }
}

fn first_token(text: &str) -> String {
    text.split_whitespace().next().unwrap_or_default().to_lowercase()
}

/// Quantity-sufficiency pre-filter, applied before relevance filtering when
/// the order is short a known quantity. Fail-closed: candidates without a
/// known `available_quantity` are dropped, and there is no fallback.
pub fn filter_by_quantity(
    candidates: Vec<Alternative>,
    missing_quantity: Option<u32>,
) -> Vec<Alternative> {
    let Some(required) = missing_quantity else {
        return candidates;
    };
    candidates
        .into_iter()
        .filter(|candidate| candidate.available_quantity.is_some_and(|have| have >= required))
        .collect()
}
