use async_trait::async_trait;
use thiserror::Error;

use restock_core::domain::conversation::{ConversationId, ConversationTurn};
use restock_core::domain::recommendation::RecommendationState;

pub mod conversation_log;
pub mod memory;
pub mod recommendation;

pub use conversation_log::SqlConversationLogRepository;
pub use memory::{InMemoryConversationLogRepository, InMemoryRecommendationStateRepository};
pub use recommendation::SqlRecommendationStateRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable per-conversation recommendation state. One writer per
/// conversation; the engine serializes turns, the store guarantees that a
/// save is a full atomic overwrite with respect to concurrent readers of the
/// same conversation.
#[async_trait]
pub trait RecommendationStateRepository: Send + Sync {
    /// Corrupt persisted rows are reported as absent, not as errors: the
    /// conversation restarts fresh rather than crashing.
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<RecommendationState>, RepositoryError>;

    async fn save(
        &self,
        id: &ConversationId,
        state: &RecommendationState,
    ) -> Result<(), RepositoryError>;

    /// Commit an advanced cursor. No-op when no state exists.
    async fn update_count(
        &self,
        id: &ConversationId,
        new_count: usize,
    ) -> Result<(), RepositoryError>;

    async fn reset(&self, id: &ConversationId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationLogRepository: Send + Sync {
    async fn append(
        &self,
        id: &ConversationId,
        turn: ConversationTurn,
    ) -> Result<(), RepositoryError>;

    async fn history(&self, id: &ConversationId)
        -> Result<Vec<ConversationTurn>, RepositoryError>;

    async fn clear(&self, id: &ConversationId) -> Result<(), RepositoryError>;
}
