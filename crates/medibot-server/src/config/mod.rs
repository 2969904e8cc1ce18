pub mod settings;

pub use settings::{
    EmailConfig, LlmConfig, LoggingConfig, OcrConfig, PromptsConfig, RagConfig, RetrievalConfig,
    ServerConfig, Settings, StorageConfig, TtsConfig, WhatsAppConfig,
};
