use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use restock_agent::engine::ConversationEngine;
use restock_agent::llm::{HttpLlmClient, LlmClient, LlmError};
use restock_agent::relevance_llm::LlmRelevanceFilter;
use restock_core::config::{AppConfig, ConfigError, LoadOptions, RelevanceStrategyKind};
use restock_core::intent::IntentClassifier;
use restock_core::relevance::{RelevanceFilter, TokenHeuristicFilter};
use restock_db::repositories::{SqlConversationLogRepository, SqlRecommendationStateRepository};
use restock_db::{connect_with_settings, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<ConversationEngine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("generation client initialization failed: {0}")]
    Llm(#[source] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?);

    let relevance: Arc<dyn RelevanceFilter> = match config.engine.relevance {
        RelevanceStrategyKind::Heuristic => Arc::new(TokenHeuristicFilter),
        RelevanceStrategyKind::Delegated => Arc::new(LlmRelevanceFilter::new(llm.clone())),
    };
    info!(
        event_name = "system.bootstrap.relevance_strategy",
        correlation_id = "bootstrap",
        strategy = ?config.engine.relevance,
        "relevance strategy selected"
    );

    let engine = Arc::new(ConversationEngine::new(
        Arc::new(SqlRecommendationStateRepository::new(db_pool.clone())),
        Arc::new(SqlConversationLogRepository::new(db_pool.clone())),
        relevance,
        llm,
        IntentClassifier::new(config.engine.intent_lexicon()),
        config.engine.batch_size,
    ));

    Ok(Application { config, db_pool, engine })
}

#[cfg(test)]
mod tests {
    use restock_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_wires_an_in_memory_deployment() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap");

        assert_eq!(app.config.database.url, "sqlite::memory:");
    }

    #[tokio::test]
    async fn bootstrap_fails_on_unreachable_database_path() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(
                    "sqlite:///definitely/not/a/real/dir/restock.db".to_string(),
                ),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
    }
}
