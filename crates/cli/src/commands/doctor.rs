use serde::Serialize;

use crate::commands::CommandResult;
use restock_core::config::{AppConfig, LoadOptions};
use restock_db::connect_with_settings;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

pub fn run(json: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "ok",
                detail: "configuration loaded and validated".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "error",
                detail: error.to_string(),
            });
            None
        }
    };

    if let Some(config) = &config {
        checks.push(database_check(config));
        checks.push(DoctorCheck {
            name: "llm_api_key",
            status: if config.llm.api_key.is_some() { "ok" } else { "warn" },
            detail: if config.llm.api_key.is_some() {
                "generation api key configured".to_string()
            } else {
                "no generation api key configured; delegated classification and prose \
                 generation will fail open to templates"
                    .to_string()
            },
        });
    }

    let healthy = checks.iter().all(|check| check.status != "error");
    let report = DoctorReport {
        command: "doctor",
        status: if healthy { "ok" } else { "error" },
        checks,
    };

    let output = if json {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
    .unwrap_or_else(|error| format!("{{\"status\":\"error\",\"message\":\"{error}\"}}"));

    CommandResult { exit_code: if healthy { 0 } else { 1 }, output }
}

fn database_check(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database",
                status: "error",
                detail: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        pool.close().await;
        Ok::<(), sqlx::Error>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database",
            status: "ok",
            detail: "database reachable".to_string(),
        },
        Err(error) => {
            DoctorCheck { name: "database", status: "error", detail: error.to_string() }
        }
    }
}
