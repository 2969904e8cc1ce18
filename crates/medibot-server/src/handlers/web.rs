use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::{error, info};

use crate::handlers::input::ChatInput;
use crate::state::AppState;
use crate::utils::error::ApiError;
use crate::utils::text::preview;

pub const EMPTY_INPUT_REPLY: &str = "⚠ Please send a message or upload an image.";
pub const SERVER_ERROR_REPLY: &str = "⚠ Server error.";

/// Sender id for web-UI requests without a session
const WEB_SENDER: &str = "web";
const SESSION_HEADER: &str = "x-session-id";
const MAX_SESSION_ID_LEN: usize = 64;

/// `web:{session}` when the client sends `X-Session-Id`, else `web`.
fn web_sender(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_SESSION_ID_LEN)
        .map(|id| format!("{}:{}", WEB_SENDER, id))
        .unwrap_or_else(|| WEB_SENDER.to_string())
}

pub async fn index() -> &'static str {
    "Medical chatbot is running."
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `POST /get`: plain-text answer for the simple web UI
pub async fn get_reply(
    State(state): State<AppState>,
    headers: HeaderMap,
    input: Result<ChatInput, ApiError>,
) -> (StatusCode, String) {
    let prepared = match input {
        Ok(input) => input.prepare(&state, WEB_SENDER).await,
        Err(e) => Err(e),
    };

    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("/get error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR_REPLY.to_string());
        }
    };

    if prepared.query.trim().is_empty() {
        return (StatusCode::OK, EMPTY_INPUT_REPLY.to_string());
    }

    let sender = web_sender(&headers);
    info!("Web message from {}: '{}'", sender, preview(&prepared.query));
    let answer = state.orchestrator.answer(&prepared.query, &sender).await;
    (StatusCode::OK, answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_web_sender_from_session_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(web_sender(&headers), "web");

        headers.insert(SESSION_HEADER, HeaderValue::from_static(" tab-42 "));
        assert_eq!(web_sender(&headers), "web:tab-42");

        headers.insert(SESSION_HEADER, HeaderValue::from_static(""));
        assert_eq!(web_sender(&headers), "web");

        let long = "x".repeat(MAX_SESSION_ID_LEN + 1);
        headers.insert(SESSION_HEADER, HeaderValue::from_str(&long).unwrap());
        assert_eq!(web_sender(&headers), "web");
    }
}
