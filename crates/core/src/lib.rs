pub mod config;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod ranking;
pub mod relevance;

pub use config::{
    AppConfig, ConfigError, ConfigOverrides, DatabaseConfig, EngineConfig, LlmConfig, LoadOptions,
    LogFormat, LoggingConfig, RelevanceStrategyKind, ServerConfig,
};
pub use domain::alternative::{dedupe_by_name, validate_candidates, Alternative};
pub use domain::conversation::{ConversationId, ConversationTurn, Speaker};
pub use domain::recommendation::RecommendationState;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use intent::{Intent, IntentClassifier, IntentLexicon, DEFAULT_FUZZY_THRESHOLD};
pub use ranking::{next_batch, rank, BatchOutcome, DEFAULT_BATCH_SIZE};
pub use relevance::{filter_by_quantity, RelevanceFilter, TokenHeuristicFilter};
