//! MIME construction shared by the SMTP-based providers.

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MessageBuilder, MultiPart};

use courier_common::error::ProviderError;
use courier_common::types::EmailMessage;

use crate::ensure_deliverable;

pub(crate) fn mailbox(address: &str) -> Result<Mailbox, ProviderError> {
    address
        .parse()
        .map_err(|e| ProviderError::InvalidAddress(format!("{address}: {e}")))
}

/// Build the MIME message for `email`.
///
/// HTML bodies carry the plain-text body as an alternative part when one is
/// present. `decorate` may add transport-specific headers.
pub(crate) fn build_message<F>(
    email: &EmailMessage,
    default_from: &str,
    decorate: F,
) -> Result<Message, ProviderError>
where
    F: FnOnce(MessageBuilder) -> MessageBuilder,
{
    ensure_deliverable(email)?;

    let from = email.sender().unwrap_or(default_from);
    let mut builder = Message::builder()
        .from(mailbox(from)?)
        .subject(email.subject.as_str());
    for recipient in &email.to {
        builder = builder.to(mailbox(recipient)?);
    }
    let builder = decorate(builder);

    let message = match (email.html(), email.text()) {
        (Some(html), Some(text)) => builder.multipart(MultiPart::alternative_plain_html(
            text.to_string(),
            html.to_string(),
        )),
        (Some(html), None) => builder
            .header(ContentType::TEXT_HTML)
            .body(html.to_string()),
        (None, Some(text)) => builder
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string()),
        (None, None) => return Err(ProviderError::MissingBody),
    };

    message.map_err(|e| ProviderError::Build(e.to_string()))
}
