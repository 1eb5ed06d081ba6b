use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Success => write!(f, "success"),
            DeliveryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The email a producer asked us to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Recipient addresses, in the order the producer supplied them.
    pub to: Vec<String>,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    /// Overrides the provider's default sender when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl EmailMessage {
    /// HTML body, treating an empty string as absent.
    pub fn html(&self) -> Option<&str> {
        self.body_html.as_deref().filter(|b| !b.is_empty())
    }

    /// Plain-text body, treating an empty string as absent.
    pub fn text(&self) -> Option<&str> {
        self.body_text.as_deref().filter(|b| !b.is_empty())
    }

    /// Sender override, treating an empty string as absent.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().filter(|f| !f.is_empty())
    }
}

/// Inbound broker envelope carrying one email send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub email: EmailMessage,
    /// Free-form tag set by the producer. Not used for ordering.
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    /// Creation time assigned by the producer, offset preserved.
    pub timestamp: DateTime<FixedOffset>,
}

/// Persisted record of one processed message.
///
/// Written exactly once per decoded `QueueMessage`, whatever the send outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailLog {
    pub id: Uuid,
    pub to: Vec<String>,
    pub subject: String,
    pub status: DeliveryStatus,
    pub provider: String,
    pub attempts: u32,
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl EmailLog {
    /// Start a record for a delivery attempt made right now.
    ///
    /// The status starts as `Failed` with no message; callers settle it with
    /// [`EmailLog::succeeded`] or [`EmailLog::failed`].
    pub fn attempt(email: &EmailMessage, provider: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            to: email.to.clone(),
            subject: email.subject.clone(),
            status: DeliveryStatus::Failed,
            provider: provider.to_string(),
            attempts: 1,
            sent_at: Utc::now(),
            error_msg: None,
        }
    }

    pub fn succeeded(mut self) -> Self {
        self.status = DeliveryStatus::Success;
        self.error_msg = None;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = DeliveryStatus::Failed;
        self.error_msg = Some(error.into());
        self
    }
}
