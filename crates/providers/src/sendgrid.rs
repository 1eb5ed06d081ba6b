//! SendGrid v3 REST delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use courier_common::config::SendGridConfig;
use courier_common::error::{ProviderError, StartupError};
use courier_common::types::EmailMessage;

use crate::{EmailProvider, ensure_deliverable};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct SendGridMessage<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

pub struct SendGridProvider {
    client: reqwest::Client,
    api_key: String,
    url: String,
    default_from: String,
}

impl SendGridProvider {
    pub fn from_config(config: &SendGridConfig, default_from: &str) -> Result<Self, StartupError> {
        let api_key = match &config.api_key {
            Some(key) if !config.url.is_empty() => key.clone(),
            _ => {
                return Err(StartupError::MissingSetting {
                    component: "sendgrid provider",
                    detail: "api key and url",
                });
            }
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StartupError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            url: config.url.clone(),
            default_from: default_from.to_string(),
        })
    }

    fn build_message<'a>(&'a self, email: &'a EmailMessage) -> SendGridMessage<'a> {
        let to = email
            .to
            .iter()
            .map(|recipient| Address {
                email: recipient.as_str(),
            })
            .collect();

        let mut content = Vec::with_capacity(2);
        if let Some(text) = email.text() {
            content.push(Content {
                kind: "text/plain",
                value: text,
            });
        }
        if let Some(html) = email.html() {
            content.push(Content {
                kind: "text/html",
                value: html,
            });
        }

        SendGridMessage {
            personalizations: vec![Personalization { to }],
            from: Address {
                email: email.sender().unwrap_or(self.default_from.as_str()),
            },
            subject: &email.subject,
            content,
        }
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), ProviderError> {
        ensure_deliverable(email)?;

        let message = self.build_message(email);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&message)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Transport(format!("failed to send request to SendGrid: {e}"))
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %body, "SendGrid rejected message");
            return Err(ProviderError::UnexpectedStatus {
                provider: "SendGrid",
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "sendgrid"
    }
}
