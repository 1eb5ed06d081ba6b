//! Outbound email transports.
//!
//! Exactly one provider serves the process. It is chosen at startup from
//! `EMAIL_PROVIDER` by [`build_provider`] and never switched afterwards.

pub mod gmail;
pub mod mailhog;
mod mime;
pub mod sendgrid;

use std::sync::Arc;

use async_trait::async_trait;

use courier_common::config::{EmailConfig, ProviderKind};
use courier_common::error::{ProviderError, StartupError};
use courier_common::types::EmailMessage;

pub use gmail::GmailProvider;
pub use mailhog::MailHogProvider;
pub use sendgrid::SendGridProvider;

/// Trait that every outbound email transport implements.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send one email. Stateless per call.
    async fn send_email(&self, email: &EmailMessage) -> Result<(), ProviderError>;

    /// Fixed lowercase identifier recorded in delivery logs (e.g. "gmail").
    fn provider_name(&self) -> &'static str;
}

/// Reject emails that cannot be sent before touching the network.
pub fn ensure_deliverable(email: &EmailMessage) -> Result<(), ProviderError> {
    if email.to.is_empty() {
        return Err(ProviderError::NoRecipients);
    }
    if email.html().is_none() && email.text().is_none() {
        return Err(ProviderError::MissingBody);
    }
    Ok(())
}

/// Resolve the configured provider into the single instance used for the
/// process lifetime.
///
/// An unknown tag or missing credentials for the selected provider is fatal.
pub fn build_provider(config: &EmailConfig) -> Result<Arc<dyn EmailProvider>, StartupError> {
    let kind = config.kind()?;
    tracing::info!(provider = %config.provider, "Initializing email provider...");

    let provider: Arc<dyn EmailProvider> = match kind {
        ProviderKind::Gmail => Arc::new(GmailProvider::from_config(
            &config.gmail,
            &config.default_from,
        )?),
        ProviderKind::SendGrid => Arc::new(SendGridProvider::from_config(
            &config.sendgrid,
            &config.default_from,
        )?),
        ProviderKind::MailHog => Arc::new(MailHogProvider::from_config(
            &config.mailhog,
            &config.default_from,
        )?),
    };

    Ok(provider)
}
