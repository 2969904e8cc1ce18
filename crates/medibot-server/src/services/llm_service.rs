use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::LlmConfig;
use crate::models::chat::ChatMessage;

/// One chat-completion call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference endpoint not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to call inference API: {0}")]
    Transport(String),

    #[error("Inference API error: {status} - {body}")]
    Status { status: u16, body: String },
}

impl InferenceError {
    /// Rate limiting is the only failure worth backing off for.
    pub fn is_rate_limited(&self) -> bool {
        let text = self.to_string().to_lowercase();
        text.contains("rate") || text.contains("429")
    }
}

/// Chat-completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Response shapes the endpoint is known to return, in the order they are tried
#[derive(Debug, Clone, Copy)]
enum ResponseShape {
    /// `{"choices": [{"message": {"content"}}]}` or `delta`/`text` variants
    Choices,
    /// `{"answer": "..."}`
    Answer,
    /// `{"result": "..."}`
    Result,
}

const SHAPE_PRIORITY: [ResponseShape; 3] = [
    ResponseShape::Choices,
    ResponseShape::Answer,
    ResponseShape::Result,
];

impl ResponseShape {
    fn extract(self, body: &Value) -> Option<String> {
        match self {
            ResponseShape::Choices => {
                let choice = body.get("choices")?.as_array()?.first()?;
                if let Some(obj) = choice.as_object() {
                    let nested = obj
                        .get("message")
                        .filter(|m| is_truthy(m))
                        .or_else(|| obj.get("delta"));
                    if let Some(content) = nested.and_then(|m| m.get("content")) {
                        return Some(value_to_text(content));
                    }
                    if let Some(text) = obj.get("text") {
                        return Some(value_to_text(text));
                    }
                }
                Some(choice.to_string())
            }
            ResponseShape::Answer => body.get("answer").map(value_to_text),
            ResponseShape::Result => body.get("result").map(value_to_text),
        }
    }
}

/// Normalise a raw response body into plain text.
///
/// Unparseable bodies come back as-is; parseable bodies matching no known
/// shape come back as their JSON serialisation.
pub fn parse_completion(raw: &str) -> String {
    let body: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            warn!("Inference response not JSON; returning raw text");
            return raw.to_string();
        }
    };

    if body.is_object() {
        for shape in SHAPE_PRIORITY {
            if let Some(text) = shape.extract(&body) {
                debug!("Parsed inference response as {:?}", shape);
                return text;
            }
        }
    }

    body.to_string()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// HTTP adapter for the chat-completion endpoint
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent("medical-chatbot/1.0")
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for LlmService {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        if !self.config.is_configured() {
            return Err(InferenceError::NotConfigured(
                "api token not set".to_string(),
            ));
        }

        debug!(
            "Calling inference model={} max_tokens={} prompt_len={}",
            request.model,
            request.max_tokens,
            request.user_prompt.len()
        );

        let payload = ChatCompletionRequest {
            model: &request.model,
            messages: vec![
                ChatMessage::system(request.system_prompt.clone()),
                ChatMessage::user(request.user_prompt.clone()),
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json")
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("HTTP error calling inference model: {}", e);
                InferenceError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(parse_completion(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Drink fluids."}}]}"#;
        assert_eq!(parse_completion(raw), "Drink fluids.");
    }

    #[test]
    fn test_parse_delta_and_text_choices() {
        let delta = r#"{"choices":[{"delta":{"content":"partial"}}]}"#;
        assert_eq!(parse_completion(delta), "partial");

        let text = r#"{"choices":[{"text":"legacy completion"}]}"#;
        assert_eq!(parse_completion(text), "legacy completion");
    }

    #[test]
    fn test_parse_unknown_choice_dumps_choice() {
        let raw = r#"{"choices":[{"index":0}]}"#;
        assert_eq!(parse_completion(raw), r#"{"index":0}"#);
    }

    #[test]
    fn test_choices_win_over_answer() {
        let raw = r#"{"answer":"second","choices":[{"message":{"content":"first"}}]}"#;
        assert_eq!(parse_completion(raw), "first");
    }

    #[test]
    fn test_parse_answer_then_result() {
        assert_eq!(parse_completion(r#"{"answer":"a"}"#), "a");
        assert_eq!(parse_completion(r#"{"result":"r"}"#), "r");
        assert_eq!(parse_completion(r#"{"answer":"a","result":"r"}"#), "a");
    }

    #[test]
    fn test_empty_choices_fall_through() {
        assert_eq!(parse_completion(r#"{"choices":[],"result":"r"}"#), "r");
    }

    #[test]
    fn test_unrecognised_and_raw_bodies() {
        assert_eq!(parse_completion(r#"{"data":1}"#), r#"{"data":1}"#);
        assert_eq!(parse_completion("plain text answer"), "plain text answer");
        assert_eq!(parse_completion("[1,2]"), "[1,2]");
    }

    #[test]
    fn test_rate_limit_detection() {
        let status = InferenceError::Status {
            status: 429,
            body: "slow down".to_string(),
        };
        assert!(status.is_rate_limited());
        assert!(InferenceError::Transport("Rate limit exceeded".to_string()).is_rate_limited());
        assert!(!InferenceError::Transport("connection reset".to_string()).is_rate_limited());
    }
}
