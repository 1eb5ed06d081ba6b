//! MongoDB document backend.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::Collection;
use mongodb::bson::{self, DateTime, Document};
use tracing::Span;

use courier_common::error::StorageError;
use courier_common::types::EmailLog;

use crate::DeliveryLogger;

/// Bound on a single insert, independent of the connect timeout.
pub const INSERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Inserts one document per `EmailLog` into a collection.
///
/// Owns only the collection handle; the client itself is disconnected by the
/// service after the logger is closed.
pub struct MongoLogger {
    collection: Collection<Document>,
    insert_timeout: Duration,
    closed: AtomicBool,
    span: Span,
}

impl MongoLogger {
    pub fn new(collection: Collection<Document>, span: Span) -> Self {
        Self {
            collection,
            insert_timeout: INSERT_TIMEOUT,
            closed: AtomicBool::new(false),
            span,
        }
    }
}

/// Convert a log into its stored document: `id` becomes `_id` and `sent_at`
/// a native BSON date.
pub fn to_document(log: &EmailLog) -> Result<Document, StorageError> {
    let mut document = bson::to_document(log)?;
    document.remove("id");
    document.insert("_id", log.id.to_string());
    document.insert(
        "sent_at",
        DateTime::from_millis(log.sent_at.timestamp_millis()),
    );
    Ok(document)
}

#[async_trait]
impl DeliveryLogger for MongoLogger {
    async fn store(&self, log: &EmailLog) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }

        let document = to_document(log)?;
        let insert = self.collection.insert_one(document).into_future();

        match tokio::time::timeout(self.insert_timeout, insert).await {
            Ok(Ok(_)) => {
                tracing::debug!(parent: &self.span, id = %log.id, "Email log entry stored in database");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(
                    parent: &self.span,
                    id = %log.id,
                    error = %e,
                    "Failed to store email log in database"
                );
                Err(e.into())
            }
            Err(_) => {
                tracing::error!(
                    parent: &self.span,
                    id = %log.id,
                    timeout_ms = self.insert_timeout.as_millis() as u64,
                    "Email log insert timed out"
                );
                Err(StorageError::Timeout(self.insert_timeout))
            }
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(parent: &self.span, "Database storage closed");
        }
    }

    fn storage_name(&self) -> &'static str {
        "database"
    }
}

#[cfg(test)]
mod tests {
    use courier_common::types::EmailMessage;

    use super::*;

    fn log(failed: bool) -> EmailLog {
        let email = EmailMessage {
            to: vec!["a@x.com".to_string(), "b@x.com".to_string()],
            subject: "Welcome".to_string(),
            body_html: Some("<p>hi</p>".to_string()),
            body_text: None,
            from: None,
        };
        let log = EmailLog::attempt(&email, "sendgrid");
        if failed {
            log.failed("SendGrid API returned status 500")
        } else {
            log.succeeded()
        }
    }

    #[test]
    fn test_document_uses_id_as_primary_key() {
        let log = log(false);
        let document = to_document(&log).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), log.id.to_string());
        assert!(!document.contains_key("id"));
        assert_eq!(document.get_str("status").unwrap(), "success");
        assert_eq!(document.get_str("provider").unwrap(), "sendgrid");
        assert!(!document.contains_key("error_msg"));
    }

    #[test]
    fn test_document_stores_native_date_and_error() {
        let log = log(true);
        let document = to_document(&log).unwrap();
        let sent_at = document.get_datetime("sent_at").unwrap();
        assert_eq!(sent_at.timestamp_millis(), log.sent_at.timestamp_millis());
        assert_eq!(
            document.get_str("error_msg").unwrap(),
            "SendGrid API returned status 500"
        );
        assert_eq!(document.get_array("to").unwrap().len(), 2);
    }
}
