use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One message in a chat-completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// ===== CHAT HISTORY MODELS =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Bot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub text: String,
    pub image_url: Option<String>,
    pub time: String,
}

impl StoredMessage {
    pub fn new(kind: MessageKind, text: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            text: text.into(),
            image_url,
            time: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

fn default_title() -> String {
    "New chat".to_string()
}

impl ChatRecord {
    pub fn new(title: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.unwrap_or_else(default_title),
            created_at: Some(Utc::now().to_rfc3339()),
            messages: Vec::new(),
        }
    }

    /// Append a user message; the first one titles the chat.
    pub fn push_user(&mut self, message: StoredMessage) {
        let is_first = self.messages.is_empty();
        if is_first && !message.text.is_empty() {
            self.title = chat_title(&message.text);
        }
        self.messages.push(message);
    }
}

/// Chat title from the first user message: 35 chars, `...` when cut.
pub fn chat_title(text: &str) -> String {
    let head = crate::utils::text::truncate_chars(text, 35);
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: Option<String>,
}

impl From<&ChatRecord> for ChatSummary {
    fn from(chat: &ChatRecord) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            created_at: chat.created_at.clone(),
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
}

/// JSON body accepted by the streaming endpoint
#[derive(Debug, Default, Deserialize)]
pub struct StreamChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "imageBase64")]
    pub image_base64: Option<String>,
}

impl StreamChatRequest {
    pub fn text(&self) -> String {
        [&self.message, &self.msg, &self.text]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub subject: String,
    pub message: String,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct ChatEnvelope {
    pub chat: ChatRecord,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct EmailResponse {
    pub sent: bool,
}
