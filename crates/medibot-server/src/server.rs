use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::{info, warn};

use crate::config::Settings;
use crate::document::{TesseractExtractor, TextExtractor};
use crate::handlers;
use crate::services::{
    ChatStore, ConnectedSenders, ConversationMemory, LlmService, Mailer, MessagingTransport,
    OrchestratorConfig, PineconeRetriever, ResponseOrchestrator, RetrievalHandle, TtsService,
    TwilioClient, WhatsAppProcessor, WhatsAppWorkerPool,
};
use crate::state::AppState;

/// Uploads larger than this are rejected
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Wire every service from settings. Retrieval starts Uninitialized; see
/// [`spawn_retrieval_init`].
pub async fn build_state(settings: Settings) -> Result<AppState> {
    tokio::fs::create_dir_all(&settings.storage.upload_dir)
        .await
        .with_context(|| format!("Failed to create upload dir {:?}", settings.storage.upload_dir))?;

    let chat_store = Arc::new(
        ChatStore::open(settings.storage.chats_file.clone())
            .await
            .context("Failed to open chat store")?,
    );

    let retrieval = RetrievalHandle::new();
    let orchestrator = Arc::new(ResponseOrchestrator::new(
        Arc::new(LlmService::new(settings.llm.clone())),
        retrieval.clone(),
        ConversationMemory::new(),
        OrchestratorConfig::from_settings(&settings),
    ));

    let extractor: Arc<dyn TextExtractor> = Arc::new(TesseractExtractor::new(&settings.ocr));
    let transport: Arc<dyn MessagingTransport> = Arc::new(TwilioClient::new(&settings.whatsapp));

    for warning in configuration_warnings(&settings) {
        warn!("{}", warning);
    }

    let processor = Arc::new(WhatsAppProcessor::new(
        orchestrator.clone(),
        transport,
        extractor.clone(),
        settings.whatsapp.from_number.clone(),
        settings.storage.upload_dir.clone(),
        settings.whatsapp.send_max_retries,
    ));
    let whatsapp_pool = WhatsAppWorkerPool::start(
        processor,
        settings.whatsapp.webhook_workers,
        settings.whatsapp.queue_capacity,
    );

    Ok(AppState {
        tts: Arc::new(TtsService::new(&settings.tts)),
        mailer: Arc::new(Mailer::new(settings.email.clone())),
        settings: Arc::new(settings),
        orchestrator,
        retrieval,
        chat_store,
        extractor,
        whatsapp_pool,
        connected_senders: Arc::new(ConnectedSenders::new()),
    })
}

/// Missing credentials that leave part of the service degraded
pub fn configuration_warnings(settings: &Settings) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !settings.llm.is_configured() {
        warnings.push("LLM api token not set (llm.api_token); answers will fall back to the error reply");
    }
    if !settings.whatsapp.is_configured() {
        warnings.push("Twilio credentials not set; WhatsApp replies will not be delivered");
    }
    warnings
}

/// Build the retrieval backend in the background; requests see
/// "loading" until it is Ready.
pub fn spawn_retrieval_init(state: &AppState) {
    let retrieval = state.retrieval.clone();
    let config = state.settings.retrieval.clone();

    tokio::spawn(async move {
        retrieval
            .initialize(false, || async move { PineconeRetriever::connect(&config).await })
            .await;
    });
}

pub fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.settings.storage.upload_dir);

    let chat_routes = Router::new()
        .route(
            "/api/chats",
            get(handlers::chats::list_chats).post(handlers::chats::create_chat),
        )
        .route(
            "/api/chats/{id}",
            get(handlers::chats::get_chat).delete(handlers::chats::delete_chat),
        )
        .route("/api/chats/{id}/messages", post(handlers::chats::add_message))
        .route("/api/chats/{id}/stream", post(handlers::chats::stream_message));

    Router::new()
        .route("/", get(handlers::web::index))
        .route("/favicon.ico", get(handlers::web::favicon))
        .route("/get", post(handlers::web::get_reply))
        .route("/whatsapp", post(handlers::whatsapp::whatsapp_webhook))
        .route("/tts", post(handlers::tools::text_to_speech))
        .route("/api/email", post(handlers::tools::send_email))
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .merge(chat_routes)
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

pub fn log_startup(settings: &Settings) {
    info!(
        "Model={} top_k={} workers={} uploads={:?}",
        settings.llm.model,
        settings.rag.top_k,
        settings.whatsapp.webhook_workers,
        settings.storage.upload_dir
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_llm_token_is_reported() {
        let mut settings = Settings::default();
        settings.whatsapp.account_sid = "AC1".to_string();
        settings.whatsapp.auth_token = "secret".to_string();

        let warnings = configuration_warnings(&settings);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("llm.api_token"));

        settings.llm.api_token = "token".to_string();
        assert!(configuration_warnings(&settings).is_empty());
    }

    #[test]
    fn test_missing_twilio_credentials_are_reported() {
        let mut settings = Settings::default();
        settings.llm.api_token = "token".to_string();

        let warnings = configuration_warnings(&settings);
        assert_eq!(warnings, vec!["Twilio credentials not set; WhatsApp replies will not be delivered"]);
    }
}
