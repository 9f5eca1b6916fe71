use sqlx::Row;
use tracing::warn;

use restock_core::domain::alternative::Alternative;
use restock_core::domain::conversation::ConversationId;
use restock_core::domain::recommendation::RecommendationState;

use super::{RecommendationStateRepository, RepositoryError};
use crate::DbPool;

pub struct SqlRecommendationStateRepository {
    pool: DbPool,
}

impl SqlRecommendationStateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RecommendationStateRepository for SqlRecommendationStateRepository {
    async fn load(
        &self,
        id: &ConversationId,
    ) -> Result<Option<RecommendationState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT original_product, missing_quantity, ranked_alternatives, recommended_count \
             FROM recommendation_state WHERE conversation_id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        match decode_state(&row) {
            Ok(state) => Ok(Some(state)),
            Err(reason) => {
                warn!(
                    event_name = "state.malformed_recovered",
                    conversation_id = %id,
                    reason = %reason,
                    "persisted recommendation state is unreadable; treating as absent"
                );
                Ok(None)
            }
        }
    }

    async fn save(
        &self,
        id: &ConversationId,
        state: &RecommendationState,
    ) -> Result<(), RepositoryError> {
        let ranked = serde_json::to_string(state.ranked_alternatives())
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO recommendation_state \
             (conversation_id, original_product, missing_quantity, ranked_alternatives, recommended_count, updated_at) \
             VALUES (?, ?, ?, ?, ?, datetime('now')) \
             ON CONFLICT(conversation_id) DO UPDATE SET \
             original_product = excluded.original_product, \
             missing_quantity = excluded.missing_quantity, \
             ranked_alternatives = excluded.ranked_alternatives, \
             recommended_count = excluded.recommended_count, \
             updated_at = excluded.updated_at",
        )
        .bind(&id.0)
        .bind(state.original_product())
        .bind(state.missing_quantity().map(i64::from))
        .bind(ranked)
        .bind(state.recommended_count() as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_count(
        &self,
        id: &ConversationId,
        new_count: usize,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE recommendation_state \
             SET recommended_count = ?, updated_at = datetime('now') \
             WHERE conversation_id = ?",
        )
        .bind(new_count as i64)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset(&self, id: &ConversationId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM recommendation_state WHERE conversation_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn decode_state(row: &sqlx::sqlite::SqliteRow) -> Result<RecommendationState, String> {
    let original_product: String = row.get("original_product");
    let missing_quantity: Option<i64> = row.get("missing_quantity");
    let ranked_json: String = row.get("ranked_alternatives");
    let recommended_count: i64 = row.get("recommended_count");

    let missing_quantity = match missing_quantity {
        None => None,
        Some(value) => {
            Some(u32::try_from(value).map_err(|_| format!("negative missing_quantity {value}"))?)
        }
    };
    let ranked: Vec<Alternative> =
        serde_json::from_str(&ranked_json).map_err(|error| error.to_string())?;
    let recommended_count = usize::try_from(recommended_count)
        .map_err(|_| format!("negative recommended_count {recommended_count}"))?;

    RecommendationState::from_parts(original_product, missing_quantity, ranked, recommended_count)
        .map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use restock_core::domain::alternative::Alternative;
    use restock_core::domain::conversation::ConversationId;
    use restock_core::domain::recommendation::RecommendationState;

    use super::SqlRecommendationStateRepository;
    use crate::repositories::RecommendationStateRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect in-memory");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    fn sample_state() -> RecommendationState {
        let ranked = vec![
            Alternative {
                rank_score: 0.9,
                available_quantity: Some(100),
                ..Alternative::named("Banana B")
            },
            Alternative {
                rank_score: 0.8,
                available_quantity: Some(80),
                ..Alternative::named("Banana C")
            },
        ];
        RecommendationState::new("Banana A", Some(30), ranked).expect("state")
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let repo = SqlRecommendationStateRepository::new(pool().await);
        let id = ConversationId("conv-1".to_owned());
        let state = sample_state();

        repo.save(&id, &state).await.expect("save");
        let loaded = repo.load(&id).await.expect("load");

        assert_eq!(loaded, Some(state));
    }

    #[tokio::test]
    async fn update_count_commits_the_cursor() {
        let repo = SqlRecommendationStateRepository::new(pool().await);
        let id = ConversationId("conv-2".to_owned());
        repo.save(&id, &sample_state()).await.expect("save");

        repo.update_count(&id, 2).await.expect("update count");

        let loaded = repo.load(&id).await.expect("load").expect("present");
        assert_eq!(loaded.recommended_count(), 2);
    }

    #[tokio::test]
    async fn update_count_without_state_is_a_noop() {
        let repo = SqlRecommendationStateRepository::new(pool().await);
        let id = ConversationId("conv-3".to_owned());

        repo.update_count(&id, 2).await.expect("update count");
        assert_eq!(repo.load(&id).await.expect("load"), None);
    }

    #[tokio::test]
    async fn reset_deletes_the_state() {
        let repo = SqlRecommendationStateRepository::new(pool().await);
        let id = ConversationId("conv-4".to_owned());
        repo.save(&id, &sample_state()).await.expect("save");

        repo.reset(&id).await.expect("reset");
        assert_eq!(repo.load(&id).await.expect("load"), None);
    }

    #[tokio::test]
    async fn corrupt_rows_are_reported_as_absent() {
        let db = pool().await;
        let repo = SqlRecommendationStateRepository::new(db.clone());
        let id = ConversationId("conv-5".to_owned());

        sqlx::query(
            "INSERT INTO recommendation_state \
             (conversation_id, original_product, missing_quantity, ranked_alternatives, recommended_count) \
             VALUES (?, 'Banana A', NULL, 'not valid json', 0)",
        )
        .bind(&id.0)
        .execute(&db)
        .await
        .expect("insert corrupt row");

        assert_eq!(repo.load(&id).await.expect("load"), None);
    }

    #[tokio::test]
    async fn conversations_do_not_interfere() {
        let repo = SqlRecommendationStateRepository::new(pool().await);
        let left = ConversationId("conv-left".to_owned());
        let right = ConversationId("conv-right".to_owned());

        repo.save(&left, &sample_state()).await.expect("save left");
        repo.save(&right, &sample_state()).await.expect("save right");
        repo.update_count(&left, 2).await.expect("advance left");
        repo.reset(&right).await.expect("reset right");

        let left_state = repo.load(&left).await.expect("load left").expect("present");
        assert_eq!(left_state.recommended_count(), 2);
        assert_eq!(repo.load(&right).await.expect("load right"), None);
    }
}
