use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use restock_agent::engine::{ChatRequest, ChatResponse, ConversationEngine, EngineError, TurnOutcome};
use restock_core::errors::{ApplicationError, InterfaceError};

#[derive(Clone)]
pub struct ServiceState {
    engine: Arc<ConversationEngine>,
}

pub fn router(engine: Arc<ConversationEngine>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/service/chat", post(chat))
        .with_state(ServiceState { engine })
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Backend OK" }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    correlation_id: String,
}

async fn chat(
    State(state): State<ServiceState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let conversation_id = request.conversation_id.clone();

    match state.engine.handle(request).await {
        Ok(outcome) => {
            info!(
                event_name = "service.chat.handled",
                correlation_id = %correlation_id,
                conversation_id = %conversation_id,
                outcome = outcome_label(&outcome),
                "chat turn handled"
            );
            Ok(Json(outcome.response().clone()))
        }
        Err(engine_error) => {
            let application_error = match engine_error {
                EngineError::Domain(domain) => ApplicationError::Domain(domain),
                EngineError::Repository(repository) => {
                    ApplicationError::Persistence(repository.to_string())
                }
            };
            error!(
                event_name = "service.chat.failed",
                correlation_id = %correlation_id,
                conversation_id = %conversation_id,
                error = %application_error,
                "chat turn failed"
            );
            let interface = application_error.into_interface(correlation_id.clone());
            let status = match &interface {
                InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((status, Json(ErrorBody { error: interface.user_message(), correlation_id })))
        }
    }
}

fn outcome_label(outcome: &TurnOutcome) -> &'static str {
    match outcome {
        TurnOutcome::Answered(_) => "answered",
        TurnOutcome::NoCandidates(_) => "no_candidates",
        TurnOutcome::Exhausted(_) => "exhausted",
        TurnOutcome::NoActiveOrder(_) => "no_active_order",
        TurnOutcome::GenerationFailed(_) => "generation_failed",
    }
}
