use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use leadflow_agent::{EngineError, QualificationEngine, SupportAgent, SupportOutcome, TurnOutcome};
use leadflow_core::domain::conversation::{ConversationSnapshot, SupportSnapshot};
use leadflow_core::domain::lead::Lead;
use leadflow_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QualificationEngine>,
    pub support: Arc<SupportAgent>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct DisqualifyRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/conversations/{key}", get(get_conversation).put(restore_conversation))
        .route("/v1/conversations/{key}/turns", post(conversation_turn))
        .route("/v1/conversations/{key}/qualify", post(qualify))
        .route("/v1/conversations/{key}/disqualify", post(disqualify))
        .route("/v1/support/{key}", get(get_support))
        .route("/v1/support/{key}/turns", post(support_turn))
        .with_state(state)
}

async fn conversation_turn(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> ApiResult<TurnOutcome> {
    let outcome = state
        .engine
        .process_turn(&key, &request.message)
        .await
        .map_err(|error| engine_error(error, &key))?;
    Ok(Json(outcome))
}

async fn get_conversation(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<ConversationSnapshot> {
    match state.engine.get_state(&key).await {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err(engine_error(EngineError::UnknownConversation(key.clone()), &key)),
        Err(error) => Err(engine_error(error, &key)),
    }
}

async fn restore_conversation(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(snapshot): Json<ConversationSnapshot>,
) -> ApiResult<ConversationSnapshot> {
    let restored =
        state.engine.restore_state(&key, snapshot).await.map_err(|error| engine_error(error, &key))?;
    Ok(Json(restored))
}

async fn qualify(Path(key): Path<String>, State(state): State<AppState>) -> ApiResult<Lead> {
    let lead = state.engine.qualify(&key).await.map_err(|error| engine_error(error, &key))?;
    Ok(Json(lead))
}

async fn disqualify(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<DisqualifyRequest>,
) -> ApiResult<Lead> {
    let lead = state
        .engine
        .disqualify(&key, &request.reason)
        .await
        .map_err(|error| engine_error(error, &key))?;
    Ok(Json(lead))
}

async fn support_turn(
    Path(key): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> ApiResult<SupportOutcome> {
    let outcome = state
        .support
        .process_turn(&key, &request.message)
        .await
        .map_err(|error| engine_error(error, &key))?;
    Ok(Json(outcome))
}

async fn get_support(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<SupportSnapshot> {
    match state.support.get_state(&key).await {
        Ok(Some(snapshot)) => Ok(Json(snapshot)),
        Ok(None) => Err(engine_error(EngineError::UnknownConversation(key.clone()), &key)),
        Err(error) => Err(engine_error(error, &key)),
    }
}

fn engine_error(error: EngineError, key: &str) -> (StatusCode, Json<ApiError>) {
    let correlation_id = Uuid::new_v4().to_string();
    if error.is_not_found() {
        info!(
            event_name = "http.conversation.not_found",
            conversation_key = key,
            correlation_id = %correlation_id,
            "conversation not found"
        );
        return (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: "No conversation exists for this key.".to_string(),
                detail: error.to_string(),
                correlation_id,
            }),
        );
    }

    let interface = ApplicationError::from(error).into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "http.request.failed",
        conversation_key = key,
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %interface,
        "request failed"
    );
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            detail: interface.to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}
