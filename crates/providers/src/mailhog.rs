//! Unauthenticated, unencrypted SMTP relay for local capture (MailHog, Mailpit).
//!
//! Not meant for the production network path.

use async_trait::async_trait;
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use courier_common::config::MailHogConfig;
use courier_common::error::{ProviderError, StartupError};
use courier_common::types::EmailMessage;

use crate::{EmailProvider, mime};

const MAILER: &str = "Courier Email Service";

pub struct MailHogProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_from: String,
}

impl MailHogProvider {
    pub fn from_config(config: &MailHogConfig, default_from: &str) -> Result<Self, StartupError> {
        if config.host.is_empty() || config.port == 0 {
            return Err(StartupError::MissingSetting {
                component: "mailhog provider",
                detail: "host and port",
            });
        }

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .build();

        Ok(Self {
            transport,
            default_from: default_from.to_string(),
        })
    }

    fn compose(&self, email: &EmailMessage) -> Result<Message, ProviderError> {
        mime::build_message(email, &self.default_from, |builder| {
            builder
                .header(XMailer(MAILER.to_string()))
                .header(XEnvironment("development".to_string()))
        })
    }
}

#[async_trait]
impl EmailProvider for MailHogProvider {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), ProviderError> {
        let message = self.compose(email)?;

        self.transport.send(message).await.map_err(|e| {
            ProviderError::Transport(format!("failed to send email via MailHog: {e}"))
        })?;

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mailhog"
    }
}

#[derive(Debug, Clone)]
struct XMailer(String);

impl Header for XMailer {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Mailer")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

#[derive(Debug, Clone)]
struct XEnvironment(String);

impl Header for XEnvironment {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Environment")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}
