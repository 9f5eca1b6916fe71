use serde::Serialize;

use restock_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    database_url: String,
    database_max_connections: u32,
    llm_base_url: String,
    llm_model: String,
    llm_api_key: &'static str,
    llm_timeout_secs: u64,
    engine_batch_size: usize,
    engine_relevance: String,
    engine_fuzzy_threshold: f64,
    server_bind_address: String,
    server_port: u16,
    log_level: String,
    log_format: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return serde_json::json!({
                "command": "config",
                "status": "error",
                "message": format!("configuration issue: {error}"),
            })
            .to_string();
        }
    };

    let effective = EffectiveConfig {
        database_url: config.database.url.clone(),
        database_max_connections: config.database.max_connections,
        llm_base_url: config.llm.base_url.clone(),
        llm_model: config.llm.model.clone(),
        llm_api_key: if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
        llm_timeout_secs: config.llm.timeout_secs,
        engine_batch_size: config.engine.batch_size,
        engine_relevance: format!("{:?}", config.engine.relevance).to_lowercase(),
        engine_fuzzy_threshold: config.engine.fuzzy_threshold,
        server_bind_address: config.server.bind_address.clone(),
        server_port: config.server.port,
        log_level: config.logging.level.clone(),
        log_format: format!("{:?}", config.logging.format).to_lowercase(),
    };

    serde_json::to_string_pretty(&effective)
        .unwrap_or_else(|error| format!("{{\"status\":\"error\",\"message\":\"{error}\"}}"))
}
