//! Delegated relevance classification through the generation collaborator.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use restock_core::domain::alternative::Alternative;
use restock_core::relevance::RelevanceFilter;

use crate::llm::{strip_deliberation, LlmClient};

/// Relevance policy that delegates the substitutability judgement to the
/// classification collaborator.
///
/// Fail-open by design: when the collaborator is unreachable or returns
/// output we cannot parse, the ORIGINAL unfiltered candidate list is
/// returned. Showing a loosely related product beats showing nothing, which
/// is the opposite trade-off from the heuristic policy's fail-closed
/// behavior. The fallback is logged and never surfaced to the customer.
pub struct LlmRelevanceFilter {
    client: Arc<dyn LlmClient>,
}

impl LlmRelevanceFilter {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn prompt(original_product: &str, candidates: &[Alternative]) -> String {
        let mut prompt = format!(
            "A grocery customer ordered \"{original_product}\", which is out of stock.\n\
             For each numbered candidate below, decide whether it is a plausible substitute.\n\
             Reply with one line per candidate, in order, formatted exactly as\n\
             <number>: relevant\n\
             or\n\
             <number>: not_relevant\n\
             with no other text.\n\
             Candidates:\n"
        );
        for (index, candidate) in candidates.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", index + 1, candidate.product_name);
        }
        prompt
    }

    /// Parse one `<number>: relevant|not_relevant` verdict per candidate.
    /// Any missing or unrecognizable verdict makes the whole output
    /// unusable - partial labelings are not trusted.
    fn parse_verdicts(reply: &str, candidate_count: usize) -> Option<Vec<bool>> {
        let mut verdicts: HashMap<usize, bool> = HashMap::new();
        for line in reply.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (number, label) = line.split_once(':')?;
            let index: usize = number.trim().trim_end_matches('.').parse().ok()?;
            let relevant = match label.trim().to_ascii_lowercase().as_str() {
                "relevant" => true,
                "not_relevant" | "not relevant" => false,
                _ => return None,
            };
            verdicts.insert(index, relevant);
        }

        (1..=candidate_count).map(|index| verdicts.get(&index).copied()).collect()
    }
}

#[async_trait]
impl RelevanceFilter for LlmRelevanceFilter {
    async fn filter(
        &self,
        original_product: &str,
        candidates: Vec<Alternative>,
    ) -> Vec<Alternative> {
        if candidates.is_empty() {
            return candidates;
        }

        let prompt = Self::prompt(original_product, &candidates);
        let reply = match self.client.complete(&prompt).await {
            Ok(raw) => strip_deliberation(&raw).to_owned(),
            Err(error) => {
                warn!(
                    event_name = "classification.fallback_open",
                    original_product,
                    candidate_count = candidates.len(),
                    error = %error,
                    "relevance classification unavailable; keeping unfiltered candidates"
                );
                return candidates;
            }
        };

        match Self::parse_verdicts(&reply, candidates.len()) {
            Some(verdicts) => {
                let kept: Vec<Alternative> = candidates
                    .into_iter()
                    .zip(verdicts)
                    .filter_map(|(candidate, relevant)| relevant.then_some(candidate))
                    .collect();
                debug!(
                    event_name = "classification.labeled",
                    original_product,
                    kept = kept.len(),
                    "delegated relevance labels applied"
                );
                kept
            }
            None => {
                warn!(
                    event_name = "classification.fallback_open",
                    original_product,
                    "relevance classification output unparseable; keeping unfiltered candidates"
                );
                candidates
            }
        }
    }
}
