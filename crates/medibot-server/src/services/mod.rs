pub mod chat_store;
pub mod conversation;
pub mod embedding_service;
pub mod intent;
pub mod llm_service;
pub mod mailer;
pub mod messaging;
pub mod orchestrator;
pub mod retrieval;
pub mod retrieval_state;
pub mod tts;
pub mod whatsapp_jobs;

pub use chat_store::ChatStore;
pub use conversation::{ConversationMemory, ConversationState};
pub use embedding_service::EmbeddingService;
pub use intent::{Intent, IntentClassifier};
pub use llm_service::{InferenceError, InferenceRequest, LlmProvider, LlmService};
pub use mailer::Mailer;
pub use messaging::{MessageHandle, MessagingError, MessagingTransport, TwilioClient};
pub use orchestrator::{OrchestratorConfig, ResponseOrchestrator};
pub use retrieval::{PineconeRetriever, RetrievalProvider, RetrievedPassage};
pub use retrieval_state::{RetrievalHandle, RetrievalState};
pub use tts::TtsService;
pub use whatsapp_jobs::{ConnectedSenders, MediaItem, WhatsAppJob, WhatsAppProcessor, WhatsAppWorkerPool};
