use async_trait::async_trait;
use tracing::Span;

use courier_common::error::StorageError;
use courier_common::types::EmailLog;

use crate::DeliveryLogger;

/// Writes a structured summary to the log stream. No durability.
pub struct ConsoleLogger {
    span: Span,
}

impl ConsoleLogger {
    pub fn new(span: Span) -> Self {
        Self { span }
    }
}

#[async_trait]
impl DeliveryLogger for ConsoleLogger {
    async fn store(&self, log: &EmailLog) -> Result<(), StorageError> {
        tracing::info!(
            parent: &self.span,
            id = %log.id,
            to = ?log.to,
            subject = %log.subject,
            status = %log.status,
            provider = %log.provider,
            attempts = log.attempts,
            error = log.error_msg.as_deref(),
            "Email log entry"
        );
        Ok(())
    }

    async fn close(&self) {
        tracing::info!(parent: &self.span, "Console storage closed");
    }

    fn storage_name(&self) -> &'static str {
        "console"
    }
}
