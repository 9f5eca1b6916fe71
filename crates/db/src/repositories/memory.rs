use std::collections::HashMap;

use tokio::sync::RwLock;

use restock_core::domain::conversation::{ConversationId, ConversationTurn};
use restock_core::domain::recommendation::RecommendationState;

use super::{ConversationLogRepository, RecommendationStateRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryRecommendationStateRepository {
    states: RwLock<HashMap<ConversationId, RecommendationState>>,
}

#[async_trait::async_trait]
impl RecommendationStateRepository for InMemoryRecommendationStateRepository {
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<RecommendationState>, RepositoryError> {
        let states = self.states.read().await;
        Ok(states.get(id).cloned())
    }

    async fn save(
        &self,
        id: &ConversationId,
        state: &RecommendationState,
    ) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.insert(id.clone(), state.clone());
        Ok(())
    }

    async fn update_count(
        &self,
        id: &ConversationId,
        new_count: usize,
    ) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(id) {
            state
                .advance_to(new_count)
                .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        }
        Ok(())
    }

    async fn reset(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        let mut states = self.states.write().await;
        states.remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationLogRepository {
    logs: RwLock<HashMap<ConversationId, Vec<ConversationTurn>>>,
}

#[async_trait::async_trait]
impl ConversationLogRepository for InMemoryConversationLogRepository {
    async fn append(
        &self,
        id: &ConversationId,
        turn: ConversationTurn,
    ) -> Result<(), RepositoryError> {
        let mut logs = self.logs.write().await;
        logs.entry(id.clone()).or_default().push(turn);
        Ok(())
    }

    async fn history(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let logs = self.logs.read().await;
        Ok(logs.get(id).cloned().unwrap_or_default())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        let mut logs = self.logs.write().await;
        logs.remove(id);
        Ok(())
    }
}
