use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::alternative::Alternative;
use crate::errors::DomainError;

/// Per-conversation recommendation state.
///
/// `ranked_alternatives` is a snapshot fixed at creation; it does not track
/// later catalog mutations. `recommended_count` is the only field that
/// changes afterwards: it moves forward monotonically, and only when a batch
/// was actually delivered to the customer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationState {
    original_product: String,
    missing_quantity: Option<u32>,
    ranked_alternatives: Vec<Alternative>,
    recommended_count: usize,
}

impl RecommendationState {
    pub fn new(
        original_product: impl Into<String>,
        missing_quantity: Option<u32>,
        ranked_alternatives: Vec<Alternative>,
    ) -> Result<Self, DomainError> {
        let state = Self {
            original_product: original_product.into(),
            missing_quantity,
            ranked_alternatives,
            recommended_count: 0,
        };
        state.validate()?;
        Ok(state)
    }

    /// Rehydrate a persisted state, including an already-advanced cursor.
    /// Used by the state store; rejects rows that violate the invariants.
    pub fn from_parts(
        original_product: impl Into<String>,
        missing_quantity: Option<u32>,
        ranked_alternatives: Vec<Alternative>,
        recommended_count: usize,
    ) -> Result<Self, DomainError> {
        let state = Self {
            original_product: original_product.into(),
            missing_quantity,
            ranked_alternatives,
            recommended_count,
        };
        state.validate()?;
        Ok(state)
    }

    /// Re-check invariants, e.g. after deserializing a persisted row.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.original_product.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "recommendation state is missing the original product name".to_owned(),
            ));
        }
        let mut seen_names = BTreeSet::new();
        for alternative in &self.ranked_alternatives {
            if alternative.product_name.trim().is_empty() {
                return Err(DomainError::InvariantViolation(
                    "ranked alternative is missing a product name".to_owned(),
                ));
            }
            if !seen_names.insert(alternative.product_name.as_str()) {
                return Err(DomainError::InvariantViolation(format!(
                    "ranked alternatives contain duplicate product `{}`",
                    alternative.product_name
                )));
            }
        }
        if self.recommended_count > self.ranked_alternatives.len() {
            return Err(DomainError::InvalidCursorAdvance {
                current: self.recommended_count,
                requested: self.recommended_count,
                total: self.ranked_alternatives.len(),
            });
        }
        Ok(())
    }

    pub fn original_product(&self) -> &str {
        &self.original_product
    }

    pub fn missing_quantity(&self) -> Option<u32> {
        self.missing_quantity
    }

    pub fn ranked_alternatives(&self) -> &[Alternative] {
        &self.ranked_alternatives
    }

    pub fn recommended_count(&self) -> usize {
        self.recommended_count
    }

    pub fn remaining(&self) -> usize {
        self.ranked_alternatives.len() - self.recommended_count
    }

    /// Commit a cursor advance after a batch was successfully delivered.
    /// Moving backwards or past the end is rejected.
    pub fn advance_to(&mut self, new_count: usize) -> Result<(), DomainError> {
        if new_count < self.recommended_count || new_count > self.ranked_alternatives.len() {
            return Err(DomainError::InvalidCursorAdvance {
                current: self.recommended_count,
                requested: new_count,
                total: self.ranked_alternatives.len(),
            });
        }
        self.recommended_count = new_count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RecommendationState;
    use crate::domain::alternative::Alternative;

    fn state_with(names: &[&str]) -> RecommendationState {
        let ranked = names.iter().map(|name| Alternative::named(*name)).collect();
        RecommendationState::new("Banana A", Some(3), ranked).expect("valid state")
    }

    #[test]
    fn cursor_advances_monotonically() {
        let mut state = state_with(&["Banana B", "Banana C", "Plantain"]);
        state.advance_to(2).expect("forward advance");
        assert_eq!(state.recommended_count(), 2);
        assert_eq!(state.remaining(), 1);

        assert!(state.advance_to(1).is_err());
        assert!(state.advance_to(4).is_err());
        assert_eq!(state.recommended_count(), 2);
    }

    #[test]
    fn duplicate_ranked_names_are_rejected() {
        let ranked = vec![Alternative::named("Banana B"), Alternative::named("Banana B")];
        assert!(RecommendationState::new("Banana A", None, ranked).is_err());
    }

    #[test]
    fn deserialized_state_can_be_revalidated() {
        let raw = r#"{
            "original_product": "Banana A",
            "missing_quantity": null,
            "ranked_alternatives": [{"product_name": "Banana B"}],
            "recommended_count": 5
        }"#;
        let state: RecommendationState = serde_json::from_str(raw).expect("parse");
        assert!(state.validate().is_err());
    }
}
