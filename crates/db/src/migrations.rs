use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "recommendation_state",
        "conversation_log",
        "idx_conversation_log_conversation_id",
    ];

    #[tokio::test]
    async fn migrations_create_the_managed_schema() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect in-memory");
        run_pending(&pool).await.expect("run migrations");

        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .expect("list schema objects");

        let names: Vec<String> = rows.iter().map(|row| row.get::<String, _>("name")).collect();
        for object in MANAGED_SCHEMA_OBJECTS {
            assert!(names.iter().any(|name| name == object), "missing schema object `{object}`");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect in-memory");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
    }
}
