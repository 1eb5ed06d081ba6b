use std::sync::Arc;

use tracing::Span;

use courier_common::error::StorageError;
use courier_common::types::{EmailLog, QueueMessage};
use courier_providers::EmailProvider;
use courier_storage::DeliveryLogger;

/// Sends one decoded message and records the outcome.
///
/// Every call produces exactly one `EmailLog`. A failed send is recorded,
/// not returned; only a failed store reaches the caller.
pub struct Dispatcher {
    provider: Arc<dyn EmailProvider>,
    storage: Arc<dyn DeliveryLogger>,
    span: Span,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        storage: Arc<dyn DeliveryLogger>,
        span: Span,
    ) -> Self {
        Self {
            provider,
            storage,
            span,
        }
    }

    pub async fn dispatch(&self, message: &QueueMessage) -> Result<EmailLog, StorageError> {
        let email = &message.email;
        let provider = self.provider.provider_name();
        let attempt = EmailLog::attempt(email, provider);

        tracing::info!(
            parent: &self.span,
            to = ?email.to,
            subject = %email.subject,
            provider,
            priority = %message.priority,
            "Sending email"
        );

        let log = match self.provider.send_email(email).await {
            Ok(()) => {
                tracing::info!(
                    parent: &self.span,
                    to = ?email.to,
                    subject = %email.subject,
                    provider,
                    "Email sent"
                );
                attempt.succeeded()
            }
            Err(e) => {
                tracing::error!(
                    parent: &self.span,
                    to = ?email.to,
                    subject = %email.subject,
                    provider,
                    error = %e,
                    "Failed to send email"
                );
                attempt.failed(e.to_string())
            }
        };

        if let Err(e) = self.storage.store(&log).await {
            tracing::error!(
                parent: &self.span,
                id = %log.id,
                to = ?email.to,
                subject = %email.subject,
                storage = self.storage.storage_name(),
                error = %e,
                "Failed to store email log"
            );
            return Err(e);
        }

        Ok(log)
    }
}
