use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::services::RetrievalState;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    retrieval: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    whatsapp_queue: usize,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// 200 once retrieval is Ready, 503 while loading or after a failed init
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let current = state.retrieval.state();

    let status = match &current {
        RetrievalState::Ready(_) => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    let reason = match &current {
        RetrievalState::Failed(reason) => Some(reason.clone()),
        _ => None,
    };

    (
        status,
        Json(ReadinessResponse {
            retrieval: current.label(),
            reason,
            whatsapp_queue: state.whatsapp_pool.pending(),
        }),
    )
}
