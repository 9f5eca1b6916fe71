use sqlx::Row;

use restock_core::domain::conversation::{ConversationId, ConversationTurn, Speaker};

use super::{ConversationLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationLogRepository {
    pool: DbPool,
}

impl SqlConversationLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationLogRepository for SqlConversationLogRepository {
    async fn append(
        &self,
        id: &ConversationId,
        turn: ConversationTurn,
    ) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO conversation_log (conversation_id, speaker, text) VALUES (?, ?, ?)")
            .bind(&id.0)
            .bind(turn.speaker.as_str())
            .bind(&turn.text)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn history(
        &self,
        id: &ConversationId,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT speaker, text FROM conversation_log WHERE conversation_id = ? ORDER BY id",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let speaker: String = row.get("speaker");
                let text: String = row.get("text");
                let speaker = Speaker::parse(&speaker).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown speaker label `{speaker}`"))
                })?;
                Ok(ConversationTurn { speaker, text })
            })
            .collect()
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversation_log WHERE conversation_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
