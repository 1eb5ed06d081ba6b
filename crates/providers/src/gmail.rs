//! Direct SMTP delivery through an authenticated relay (Gmail by default).

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use courier_common::config::GmailConfig;
use courier_common::error::{ProviderError, StartupError};
use courier_common::types::EmailMessage;

use crate::{EmailProvider, mime};

/// Port that speaks TLS from the first byte; every other port upgrades via STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

pub struct GmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    default_from: String,
}

impl GmailProvider {
    pub fn from_config(config: &GmailConfig, default_from: &str) -> Result<Self, StartupError> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Err(StartupError::MissingSetting {
                component: "gmail provider",
                detail: "username and password",
            });
        };
        if config.host.is_empty() {
            return Err(StartupError::MissingSetting {
                component: "gmail provider",
                detail: "a host",
            });
        }

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| StartupError::Config(format!("invalid SMTP host {}: {e}", config.host)))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(username.clone(), password.clone()))
            .build();

        Ok(Self {
            transport,
            default_from: default_from.to_string(),
        })
    }

    fn compose(&self, email: &EmailMessage) -> Result<Message, ProviderError> {
        mime::build_message(email, &self.default_from, |builder| builder)
    }
}

#[async_trait]
impl EmailProvider for GmailProvider {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), ProviderError> {
        let message = self.compose(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to send email via Gmail: {e}")))?;

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "gmail"
    }
}
