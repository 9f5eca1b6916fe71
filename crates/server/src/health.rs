use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use restock_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let service =
        HealthCheck { status: "ok", detail: "conversation engine loaded".to_string() };

    let healthy = database.status == "ok";
    let response = HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        service,
        database,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code =
        if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(response))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => HealthCheck { status: "ok", detail: "database reachable".to_string() },
        Err(error) => HealthCheck { status: "error", detail: error.to_string() },
    }
}
