use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::models::chat::{EmailRequest, EmailResponse, TtsRequest};
use crate::state::AppState;

/// `POST /tts`: MP3 audio for `{text}`
pub async fn text_to_speech(State(state): State<AppState>, body: Bytes) -> Response {
    let text = serde_json::from_slice::<TtsRequest>(&body)
        .ok()
        .and_then(|r| r.text)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Text required"}))).into_response();
    }

    match state.tts.synthesize(&text).await {
        Ok(audio) => ([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response(),
        Err(e) => {
            error!("TTS error: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "TTS failed"})),
            )
                .into_response()
        }
    }
}

/// `POST /api/email`
pub async fn send_email(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Json<EmailResponse> {
    let sent = state
        .mailer
        .send_email(&request.to, &request.subject, &request.message)
        .await;
    Json(EmailResponse { sent })
}
