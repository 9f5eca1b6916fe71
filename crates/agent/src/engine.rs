//! One-turn conversation orchestration.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use restock_core::domain::alternative::{dedupe_by_name, validate_candidates, Alternative};
use restock_core::domain::conversation::{ConversationId, ConversationTurn};
use restock_core::domain::recommendation::RecommendationState;
use restock_core::errors::DomainError;
use restock_core::intent::{Intent, IntentClassifier};
use restock_core::ranking::{next_batch, rank, BatchOutcome};
use restock_core::relevance::{filter_by_quantity, RelevanceFilter};

use restock_db::repositories::{
    ConversationLogRepository, RecommendationStateRepository, RepositoryError,
};

use crate::composer::MessageComposer;
use crate::llm::{strip_deliberation, LlmClient};

/// One inbound conversation turn. A request carrying a non-empty candidate
/// set is a "first call" that creates recommendation state; anything else is
/// a follow-up against previously persisted state.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub original_product: Option<String>,
    #[serde(default)]
    pub missing_quantity: Option<u32>,
    #[serde(default)]
    pub candidates: Vec<Alternative>,
}

/// Stable client-facing shape. `Options` deliberately omits `rank_score` and
/// quantity fields - internal ranking signals never reach the customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "Answers")]
    pub answers: String,
    #[serde(rename = "Options")]
    pub options: Vec<OptionItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionItem {
    pub product_name: String,
    pub allergens: Vec<String>,
    pub non_allergens: Vec<String>,
    pub ingredients: Vec<String>,
}

impl From<&Alternative> for OptionItem {
    fn from(alternative: &Alternative) -> Self {
        Self {
            product_name: alternative.product_name.clone(),
            allergens: alternative.allergens.iter().cloned().collect(),
            non_allergens: alternative.non_allergens.iter().cloned().collect(),
            ingredients: alternative.ingredients.clone(),
        }
    }
}

/// Tagged result of one turn. Callers branch exhaustively instead of
/// inspecting ad hoc response fields; every variant still carries a
/// customer-presentable response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Normal reply, possibly with a batch of options.
    Answered(ChatResponse),
    /// A first call filtered every candidate away; nothing was persisted.
    NoCandidates(ChatResponse),
    /// A follow-up "more" found no remaining batch; state left unchanged.
    Exhausted(ChatResponse),
    /// A follow-up "more" found no stored state for this conversation.
    NoActiveOrder(ChatResponse),
    /// Generation failed and a templated apology was substituted. The batch
    /// that failed to render was not delivered, so the cursor did not move.
    GenerationFailed(ChatResponse),
}

impl TurnOutcome {
    pub fn response(&self) -> &ChatResponse {
        match self {
            Self::Answered(response)
            | Self::NoCandidates(response)
            | Self::Exhausted(response)
            | Self::NoActiveOrder(response)
            | Self::GenerationFailed(response) => response,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("state store failure: {0}")]
    Repository(#[from] RepositoryError),
}

/// Orchestrates one turn end-to-end: selection and batching from
/// `restock-core`, persistence through the repository ports, prose through
/// the generation port.
///
/// Per-conversation discipline: a registry of conversation-keyed mutexes
/// guarantees at most one in-flight read-modify-write sequence per
/// conversation. The recommendation cursor commits strictly after a
/// successful generation response; a generation failure re-serves the same
/// batch on the customer's next request.
pub struct ConversationEngine {
    states: Arc<dyn RecommendationStateRepository>,
    log: Arc<dyn ConversationLogRepository>,
    relevance: Arc<dyn RelevanceFilter>,
    llm: Arc<dyn LlmClient>,
    classifier: IntentClassifier,
    composer: MessageComposer,
    batch_size: usize,
    locks: RwLock<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ConversationEngine {
    pub fn new(
        states: Arc<dyn RecommendationStateRepository>,
        log: Arc<dyn ConversationLogRepository>,
        relevance: Arc<dyn RelevanceFilter>,
        llm: Arc<dyn LlmClient>,
        classifier: IntentClassifier,
        batch_size: usize,
    ) -> Self {
        Self {
            states,
            log,
            relevance,
            llm,
            classifier,
            composer: MessageComposer,
            batch_size: batch_size.max(1),
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<TurnOutcome, EngineError> {
        let id = ConversationId(request.conversation_id.clone());
        let lock = self.lock_for(&id).await;
        let _guard = lock.lock().await;

        let original_product =
            request.original_product.as_deref().map(str::trim).filter(|p| !p.is_empty());

        match original_product {
            Some(product) if !request.candidates.is_empty() => {
                self.first_call(&id, product, &request).await
            }
            None if !request.candidates.is_empty() => Err(DomainError::InvariantViolation(
                "candidate set supplied without an original product".to_owned(),
            )
            .into()),
            _ => self.follow_up(&id, request.message.as_deref()).await,
        }
    }

    async fn first_call(
        &self,
        id: &ConversationId,
        original_product: &str,
        request: &ChatRequest,
    ) -> Result<TurnOutcome, EngineError> {
        validate_candidates(&request.candidates)?;

        let unique = dedupe_by_name(request.candidates.clone());
        let sufficient = filter_by_quantity(unique, request.missing_quantity);
        let relevant = self.relevance.filter(original_product, sufficient).await;

        info!(
            event_name = "engine.turn.first_call",
            conversation_id = %id,
            original_product,
            submitted = request.candidates.len(),
            surviving = relevant.len(),
            "first call filtered candidate set"
        );

        if relevant.is_empty() {
            let response = ChatResponse {
                answers: self.composer.no_candidates_message(original_product),
                options: Vec::new(),
            };
            self.log_turn_pair(id, request.message.as_deref(), &response.answers).await?;
            return Ok(TurnOutcome::NoCandidates(response));
        }

        let ranked = rank(relevant);
        let mut state =
            RecommendationState::new(original_product, request.missing_quantity, ranked)?;

        let BatchOutcome::Batch { alternatives, next_count } =
            next_batch(&state, self.batch_size)
        else {
            // Unreachable: the ranked set is non-empty and the cursor is 0.
            let response = ChatResponse {
                answers: self.composer.no_candidates_message(original_product),
                options: Vec::new(),
            };
            return Ok(TurnOutcome::NoCandidates(response));
        };

        let prompt = self.composer.first_recommendation_prompt(
            original_product,
            request.missing_quantity,
            &alternatives,
        );

        match self.generate(&prompt).await {
            Ok(answers) => {
                state.advance_to(next_count)?;
                self.states.save(id, &state).await?;
                let response = ChatResponse {
                    answers,
                    options: alternatives.iter().map(OptionItem::from).collect(),
                };
                self.log_turn_pair(id, request.message.as_deref(), &response.answers).await?;
                info!(
                    event_name = "engine.batch.delivered",
                    conversation_id = %id,
                    batch_len = response.options.len(),
                    recommended_count = next_count,
                    "first batch delivered and cursor committed"
                );
                Ok(TurnOutcome::Answered(response))
            }
            Err(()) => {
                // Persist the snapshot with an unmoved cursor so the next
                // request serves this same batch.
                self.states.save(id, &state).await?;
                let response = ChatResponse {
                    answers: self.composer.fallback_recommendation(),
                    options: Vec::new(),
                };
                self.log_turn_pair(id, request.message.as_deref(), &response.answers).await?;
                Ok(TurnOutcome::GenerationFailed(response))
            }
        }
    }

    async fn follow_up(
        &self,
        id: &ConversationId,
        message: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let intent = self.classifier.classify(message);
        info!(
            event_name = "engine.turn.follow_up",
            conversation_id = %id,
            intent = ?intent,
            "classified follow-up message"
        );

        match intent {
            Intent::End => self.close_conversation(id).await,
            Intent::Other => self.generic_reply(id, message).await,
            Intent::More => self.more_options(id, message).await,
        }
    }

    async fn close_conversation(&self, id: &ConversationId) -> Result<TurnOutcome, EngineError> {
        let history = self.log.history(id).await?;
        let prompt = self.composer.closing_prompt(&history);
        let answers = match self.generate(&prompt).await {
            Ok(answers) => answers,
            Err(()) => self.composer.fallback_closing(),
        };

        self.states.reset(id).await?;
        self.log.clear(id).await?;
        info!(
            event_name = "engine.conversation.reset",
            conversation_id = %id,
            "conversation ended; state and log cleared"
        );

        Ok(TurnOutcome::Answered(ChatResponse { answers, options: Vec::new() }))
    }

    async fn generic_reply(
        &self,
        id: &ConversationId,
        message: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let history = self.log.history(id).await?;
        let prompt = self.composer.generic_prompt(message.unwrap_or_default(), &history);
        let answers = match self.generate(&prompt).await {
            Ok(answers) => answers,
            Err(()) => self.composer.fallback_generic(),
        };

        let response = ChatResponse { answers, options: Vec::new() };
        self.log_turn_pair(id, message, &response.answers).await?;
        Ok(TurnOutcome::Answered(response))
    }

    async fn more_options(
        &self,
        id: &ConversationId,
        message: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let Some(state) = self.states.load(id).await? else {
            let response = ChatResponse {
                answers: self.composer.no_active_order_message(),
                options: Vec::new(),
            };
            self.log_turn_pair(id, message, &response.answers).await?;
            return Ok(TurnOutcome::NoActiveOrder(response));
        };

        match next_batch(&state, self.batch_size) {
            BatchOutcome::Exhausted => {
                info!(
                    event_name = "engine.batch.exhausted",
                    conversation_id = %id,
                    recommended_count = state.recommended_count(),
                    "no remaining alternatives to show"
                );
                let response = ChatResponse {
                    answers: self.composer.exhausted_message(),
                    options: Vec::new(),
                };
                self.log_turn_pair(id, message, &response.answers).await?;
                Ok(TurnOutcome::Exhausted(response))
            }
            BatchOutcome::Batch { alternatives, next_count } => {
                let history = self.log.history(id).await?;
                let prompt = self.composer.more_options_prompt(
                    state.original_product(),
                    &alternatives,
                    &history,
                );

                match self.generate(&prompt).await {
                    Ok(answers) => {
                        self.states.update_count(id, next_count).await?;
                        let response = ChatResponse {
                            answers,
                            options: alternatives.iter().map(OptionItem::from).collect(),
                        };
                        self.log_turn_pair(id, message, &response.answers).await?;
                        info!(
                            event_name = "engine.batch.delivered",
                            conversation_id = %id,
                            batch_len = response.options.len(),
                            recommended_count = next_count,
                            "follow-up batch delivered and cursor committed"
                        );
                        Ok(TurnOutcome::Answered(response))
                    }
                    Err(()) => {
                        let response = ChatResponse {
                            answers: self.composer.fallback_recommendation(),
                            options: Vec::new(),
                        };
                        self.log_turn_pair(id, message, &response.answers).await?;
                        Ok(TurnOutcome::GenerationFailed(response))
                    }
                }
            }
        }
    }

    /// Run the generation port and strip deliberation markers. Failures are
    /// logged and reported as `Err(())`; the caller substitutes a template
    /// and decides what may or may not be committed.
    async fn generate(&self, prompt: &str) -> Result<String, ()> {
        match self.llm.complete(prompt).await {
            Ok(raw) => Ok(strip_deliberation(&raw).to_owned()),
            Err(error) => {
                warn!(
                    event_name = "engine.generation.degraded",
                    error = %error,
                    "generation collaborator failed; substituting template"
                );
                Err(())
            }
        }
    }

    async fn log_turn_pair(
        &self,
        id: &ConversationId,
        customer_message: Option<&str>,
        assistant_reply: &str,
    ) -> Result<(), EngineError> {
        if let Some(message) = customer_message.map(str::trim).filter(|m| !m.is_empty()) {
            self.log.append(id, ConversationTurn::customer(message)).await?;
        }
        self.log.append(id, ConversationTurn::assistant(assistant_reply)).await?;
        Ok(())
    }

    async fn lock_for(&self, id: &ConversationId) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(id) {
                return lock.clone();
            }
        }
        let mut locks = self.locks.write().await;
        locks.entry(id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
