use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// A candidate substitute product offered when the ordered product is missing.
///
/// `product_name` is the identity key within one candidate set. `rank_score`
/// is the predicted likelihood that the customer accepts the substitute;
/// `available_quantity` of `None` means the product is not
/// quantity-constrained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub product_name: String,
    #[serde(default)]
    pub allergens: BTreeSet<String>,
    #[serde(default)]
    pub non_allergens: BTreeSet<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub rank_score: f64,
    #[serde(default)]
    pub available_quantity: Option<u32>,
}

impl Alternative {
    pub fn named(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            allergens: BTreeSet::new(),
            non_allergens: BTreeSet::new(),
            ingredients: Vec::new(),
            rank_score: 0.0,
            available_quantity: None,
        }
    }
}

/// Collapse duplicate product names, keeping the first occurrence in input
/// order. All downstream operations (filtering, ranking, batching) assume
/// unique names.
pub fn dedupe_by_name(candidates: Vec<Alternative>) -> Vec<Alternative> {
    let mut seen_names = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen_names.insert(candidate.product_name.clone()))
        .collect()
}

/// A candidate set with a missing identity field is a contract violation
/// reported to the caller, never silently coerced.
pub fn validate_candidates(candidates: &[Alternative]) -> Result<(), DomainError> {
    for candidate in candidates {
        if candidate.product_name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "candidate alternative is missing a product name".to_owned(),
            ));
        }
    }
    Ok(())
}
