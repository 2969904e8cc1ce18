use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, warn};

use crate::config::EmailConfig;

/// SMTPS (implicit TLS, port 465) notifier
#[derive(Clone)]
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.address.is_empty() && !self.config.password.is_empty()
    }

    /// Returns whether the message was handed to the SMTP server.
    pub async fn send_email(&self, to: &str, subject: &str, message: &str) -> bool {
        if !self.is_configured() {
            warn!("Email credentials not set; skipping mail to {}", to);
            return false;
        }

        match self.deliver(to, subject, message).await {
            Ok(()) => {
                info!("Email sent to {}", to);
                true
            }
            Err(e) => {
                error!("Email to {} failed: {:#}", to, e);
                false
            }
        }
    }

    fn build_message(&self, to: &str, subject: &str, message: &str) -> Result<Message> {
        Message::builder()
            .from(self.config.address.parse().context("Invalid sender address")?)
            .to(to.parse().context("Invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
            .context("Failed to build email")
    }

    async fn deliver(&self, to: &str, subject: &str, message: &str) -> Result<()> {
        let email = self.build_message(to, subject, message)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .context("Failed to create SMTP transport")?
            .port(465)
            .credentials(Credentials::new(
                self.config.address.clone(),
                self.config.password.clone(),
            ))
            .build();

        transport.send(email).await.context("SMTP send failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Mailer {
        Mailer::new(EmailConfig {
            smtp_host: "smtp.example.invalid".to_string(),
            address: "bot@example.com".to_string(),
            password: "secret".to_string(),
        })
    }

    #[tokio::test]
    async fn test_missing_credentials_returns_false() {
        let mailer = Mailer::new(EmailConfig::default());
        assert!(!mailer.is_configured());
        assert!(!mailer.send_email("a@example.com", "s", "m").await);
    }

    #[test]
    fn test_build_message_validates_addresses() {
        let mailer = configured();
        assert!(mailer.build_message("patient@example.com", "Report", "Body").is_ok());
        assert!(mailer.build_message("not an address", "Report", "Body").is_err());
    }

    #[tokio::test]
    async fn test_invalid_recipient_returns_false() {
        assert!(!configured().send_email("nope", "s", "m").await);
    }
}
