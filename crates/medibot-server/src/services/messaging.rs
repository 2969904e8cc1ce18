use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::WhatsAppConfig;
use crate::utils::filename::{extension_for_content_type, extension_from_url};

/// Sent instead of an empty reply
pub const EMPTY_BODY_PLACEHOLDER: &str = "(response is being prepared)";

const MEDIA_TIMEOUT: Duration = Duration::from_secs(15);

/// Provider-assigned id of an accepted outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub sid: String,
}

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Messaging credentials not configured")]
    NotConfigured,

    #[error("Twilio error {code}: {message}")]
    Provider { code: u32, message: String },

    #[error("Messaging transport error: {0}")]
    Transport(String),
}

impl MessagingError {
    /// Errors that will fail the same way on every retry
    pub fn is_permanent(&self) -> bool {
        match self {
            MessagingError::NotConfigured => true,
            MessagingError::Provider { code, .. } => (20000..30000).contains(code),
            MessagingError::Transport(_) => false,
        }
    }
}

/// Outbound WhatsApp messaging and inbound media retrieval
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Whether credentials are present; unconfigured transports cannot send.
    fn is_configured(&self) -> bool;

    async fn send(&self, to: &str, from: &str, body: &str) -> Result<MessageHandle, MessagingError>;

    /// Download one inbound media item into `dest_dir`, returning the saved path.
    async fn fetch_media(
        &self,
        url: &str,
        content_type: Option<String>,
        dest_dir: &Path,
    ) -> Result<PathBuf, MessagingError>;
}

/// Send with retries. Returns `None` once retries are exhausted or the
/// provider rejects the message permanently.
pub async fn safe_send(
    transport: &dyn MessagingTransport,
    to: &str,
    from: &str,
    body: &str,
    max_retries: u32,
) -> Option<MessageHandle> {
    let body = if body.trim().is_empty() {
        EMPTY_BODY_PLACEHOLDER
    } else {
        body
    };

    for attempt in 1..=max_retries {
        match transport.send(to, from, body).await {
            Ok(handle) => {
                info!("Sent message to {} (sid={})", to, handle.sid);
                return Some(handle);
            }
            Err(e) if e.is_permanent() => {
                error!("Permanent send failure to {}: {}", to, e);
                return None;
            }
            Err(e) => {
                warn!("Send attempt {}/{} to {} failed: {}", attempt, max_retries, to, e);
                if attempt < max_retries {
                    tokio::time::sleep(Duration::from_millis(500) * attempt).await;
                }
            }
        }
    }

    error!("Giving up sending to {} after {} attempts", to, max_retries);
    None
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<u32>,
    #[serde(default)]
    message: String,
}

/// Twilio REST client (Messages API + authenticated media fetch)
#[derive(Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    api_base_url: String,
}

impl TwilioClient {
    pub fn new(config: &WhatsAppConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base_url, self.account_sid
        )
    }
}

#[async_trait::async_trait]
impl MessagingTransport for TwilioClient {
    fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty()
    }

    async fn send(&self, to: &str, from: &str, body: &str) -> Result<MessageHandle, MessagingError> {
        if !self.is_configured() {
            return Err(MessagingError::NotConfigured);
        }

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TwilioErrorBody>(&text) {
                Ok(TwilioErrorBody {
                    code: Some(code),
                    message,
                }) => MessagingError::Provider { code, message },
                _ => MessagingError::Transport(format!("HTTP {}: {}", status, text)),
            });
        }

        let resource: MessageResource = serde_json::from_str(&text)
            .map_err(|e| MessagingError::Transport(format!("Invalid Twilio response: {}", e)))?;

        Ok(MessageHandle { sid: resource.sid })
    }

    async fn fetch_media(
        &self,
        url: &str,
        content_type: Option<String>,
        dest_dir: &Path,
    ) -> Result<PathBuf, MessagingError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(MEDIA_TIMEOUT)
            .send()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MessagingError::Transport(format!(
                "Media download failed ({}) for {}",
                response.status(),
                url
            )));
        }

        let extension = content_type
            .as_deref()
            .filter(|ct| !ct.is_empty())
            .map(extension_for_content_type)
            .unwrap_or_else(|| extension_from_url(url));

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;

        let path = dest_dir.join(format!("wa_{}.{}", uuid::Uuid::new_v4().simple(), extension));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| MessagingError::Transport(format!("Failed to save media: {}", e)))?;

        debug!("Saved {} bytes of media to {:?}", bytes.len(), path);
        Ok(path)
    }
}
