use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::intent::{IntentLexicon, DEFAULT_FUZZY_THRESHOLD};
use crate::ranking::DEFAULT_BATCH_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub relevance: RelevanceStrategyKind,
    pub fuzzy_threshold: f64,
    pub closing_phrases: Vec<String>,
    pub continuation_phrases: Vec<String>,
}

impl EngineConfig {
    /// Build the classifier lexicon; empty phrase lists fall back to the
    /// built-in defaults.
    pub fn intent_lexicon(&self) -> IntentLexicon {
        let mut lexicon = IntentLexicon::default();
        if !self.closing_phrases.is_empty() {
            lexicon.closing_phrases = self.closing_phrases.clone();
        }
        if !self.continuation_phrases.is_empty() {
            lexicon.continuation_phrases = self.continuation_phrases.clone();
        }
        lexicon.fuzzy_threshold = self.fuzzy_threshold;
        lexicon
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceStrategyKind {
    Heuristic,
    Delegated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub relevance: Option<RelevanceStrategyKind>,
    pub batch_size: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://restock.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                base_url: "https://api.featherless.ai/v1".to_string(),
                model: "deepseek-ai/DeepSeek-R1-0528".to_string(),
                api_key: None,
                timeout_secs: 30,
                max_retries: 2,
            },
            engine: EngineConfig {
                batch_size: DEFAULT_BATCH_SIZE,
                relevance: RelevanceStrategyKind::Heuristic,
                fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
                closing_phrases: Vec::new(),
                continuation_phrases: Vec::new(),
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for RelevanceStrategyKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "delegated" => Ok(Self::Delegated),
            other => Err(ConfigError::Validation(format!(
                "unsupported relevance strategy `{other}` (expected heuristic|delegated)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    engine: Option<EnginePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    batch_size: Option<usize>,
    relevance: Option<RelevanceStrategyKind>,
    fuzzy_threshold: Option<f64>,
    closing_phrases: Option<Vec<String>>,
    continuation_phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    /// Load order: built-in defaults, then the optional TOML file, then
    /// `RESTOCK_*` environment variables, then programmatic overrides. Later
    /// sources win. The merged result is validated before use.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let maybe_path = resolve_config_path(options.config_path.as_deref());
        match maybe_path {
            Some(path) if path.exists() => {
                let patch = read_patch(&path)?;
                config.apply_patch(patch);
            }
            Some(path) if options.require_file => {
                return Err(ConfigError::MissingConfigFile(path));
            }
            _ => {}
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            merge(&mut self.database.url, database.url);
            merge(&mut self.database.max_connections, database.max_connections);
            merge(&mut self.database.timeout_secs, database.timeout_secs);
        }
        if let Some(llm) = patch.llm {
            merge(&mut self.llm.base_url, llm.base_url);
            merge(&mut self.llm.model, llm.model);
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            merge(&mut self.llm.timeout_secs, llm.timeout_secs);
            merge(&mut self.llm.max_retries, llm.max_retries);
        }
        if let Some(engine) = patch.engine {
            merge(&mut self.engine.batch_size, engine.batch_size);
            merge(&mut self.engine.relevance, engine.relevance);
            merge(&mut self.engine.fuzzy_threshold, engine.fuzzy_threshold);
            merge(&mut self.engine.closing_phrases, engine.closing_phrases);
            merge(&mut self.engine.continuation_phrases, engine.continuation_phrases);
        }
        if let Some(server) = patch.server {
            merge(&mut self.server.bind_address, server.bind_address);
            merge(&mut self.server.port, server.port);
        }
        if let Some(logging) = patch.logging {
            merge(&mut self.logging.level, logging.level);
            merge(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(url) = read_env("RESTOCK_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(level) = read_env("RESTOCK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = read_env("RESTOCK_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(base_url) = read_env("RESTOCK_LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(model) = read_env("RESTOCK_LLM_MODEL") {
            self.llm.model = model;
        }
        // The upstream deployment provisions the key as FEATHERLESS_API_KEY;
        // the RESTOCK_ name wins when both are present.
        if let Some(api_key) =
            read_env("RESTOCK_LLM_API_KEY").or_else(|| read_env("FEATHERLESS_API_KEY"))
        {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(value) = read_env("RESTOCK_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("RESTOCK_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RESTOCK_ENGINE_BATCH_SIZE") {
            self.engine.batch_size = parse_env("RESTOCK_ENGINE_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("RESTOCK_ENGINE_RELEVANCE") {
            self.engine.relevance = value.parse()?;
        }
        if let Some(value) = read_env("RESTOCK_ENGINE_FUZZY_THRESHOLD") {
            self.engine.fuzzy_threshold = parse_env("RESTOCK_ENGINE_FUZZY_THRESHOLD", &value)?;
        }
        if let Some(bind_address) = read_env("RESTOCK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = bind_address;
        }
        if let Some(value) = read_env("RESTOCK_SERVER_PORT") {
            self.server.port = parse_env("RESTOCK_SERVER_PORT", &value)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        merge(&mut self.database.url, overrides.database_url);
        merge(&mut self.logging.level, overrides.log_level);
        merge(&mut self.llm.base_url, overrides.llm_base_url);
        merge(&mut self.llm.model, overrides.llm_model);
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
        merge(&mut self.engine.relevance, overrides.relevance);
        merge(&mut self.engine.batch_size, overrides.batch_size);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_owned()));
        }
        if self.engine.batch_size == 0 {
            return Err(ConfigError::Validation("engine.batch_size must be at least 1".to_owned()));
        }
        if !(0.0..=1.0).contains(&self.engine.fuzzy_threshold) {
            return Err(ConfigError::Validation(
                "engine.fuzzy_threshold must be within 0.0..=1.0".to_owned(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "llm.timeout_secs must be at least 1".to_owned(),
            ));
        }
        if self.engine.relevance == RelevanceStrategyKind::Delegated
            && self.llm.base_url.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "engine.relevance = delegated requires llm.base_url".to_owned(),
            ));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

fn merge<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_owned(),
        value: value.to_owned(),
    })
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = read_env("RESTOCK_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = PathBuf::from("restock.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}
