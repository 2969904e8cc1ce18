use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::document::TextExtractor;
use crate::services::{
    ChatStore, ConnectedSenders, Mailer, ResponseOrchestrator, RetrievalHandle, TtsService,
    WhatsAppWorkerPool,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<ResponseOrchestrator>,
    pub retrieval: RetrievalHandle,
    pub chat_store: Arc<ChatStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub whatsapp_pool: WhatsAppWorkerPool,
    pub connected_senders: Arc<ConnectedSenders>,
    pub tts: Arc<TtsService>,
    pub mailer: Arc<Mailer>,
}

impl FromRef<AppState> for Arc<ChatStore> {
    fn from_ref(state: &AppState) -> Self {
        state.chat_store.clone()
    }
}
