use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    Json,
};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::handlers::input::ChatInput;
use crate::models::chat::{
    ChatEnvelope, ChatRecord, ChatSummary, CreateChatRequest, MessageKind, OkResponse,
    StoredMessage,
};
use crate::services::ChatStore;
use crate::state::AppState;
use crate::utils::error::ApiError;

const LINE_DELAY: Duration = Duration::from_millis(10);

pub async fn list_chats(State(store): State<Arc<ChatStore>>) -> Json<Vec<ChatSummary>> {
    Json(store.list().await)
}

/// Body is optional; anything that is not `{title}` JSON gets the default title.
pub async fn create_chat(
    State(store): State<Arc<ChatStore>>,
    body: Bytes,
) -> Result<Json<ChatRecord>, ApiError> {
    let request: CreateChatRequest = serde_json::from_slice(&body).unwrap_or_default();
    Ok(Json(store.create(request.title).await?))
}

pub async fn get_chat(
    State(store): State<Arc<ChatStore>>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatRecord>, ApiError> {
    Ok(Json(store.get(&chat_id).await?))
}

pub async fn delete_chat(
    State(store): State<Arc<ChatStore>>,
    Path(chat_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    store.delete(&chat_id).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Store the user message, answer it and store the reply.
async fn exchange(state: &AppState, chat_id: &str, input: ChatInput) -> Result<String, ApiError> {
    // 404 before any upload is written
    state.chat_store.get(chat_id).await?;

    let prepared = input.prepare(state, chat_id).await?;
    if prepared.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Message or image required".to_string()));
    }

    state
        .chat_store
        .append(
            chat_id,
            StoredMessage::new(MessageKind::User, prepared.display_text, prepared.image_url),
        )
        .await?;

    info!("Chat {} message ({} chars)", chat_id, prepared.query.len());
    let answer = state.orchestrator.answer(&prepared.query, chat_id).await;

    state
        .chat_store
        .append(chat_id, StoredMessage::new(MessageKind::Bot, answer.clone(), None))
        .await?;

    Ok(answer)
}

/// `POST /api/chats/{id}/messages`
pub async fn add_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    input: ChatInput,
) -> Result<Json<ChatEnvelope>, ApiError> {
    exchange(&state, &chat_id, input).await?;
    let chat = state.chat_store.get(&chat_id).await?;
    Ok(Json(ChatEnvelope { chat }))
}

/// `POST /api/chats/{id}/stream`: the answer as SSE, one event per line
pub async fn stream_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    input: ChatInput,
) -> Result<impl IntoResponse, ApiError> {
    let answer = exchange(&state, &chat_id, input).await?;
    debug!("Streaming {} lines to chat {}", answer.lines().count(), chat_id);

    Ok((
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(answer_events(answer)),
    ))
}

fn answer_events(answer: String) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        for line in answer.split('\n') {
            yield Ok(Event::default().data(line.replace('\r', "")));
            tokio::time::sleep(LINE_DELAY).await;
        }
        yield Ok(Event::default().data("[DONE]"));
    }
}
