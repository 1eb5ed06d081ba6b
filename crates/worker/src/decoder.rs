use courier_common::error::DecodeError;
use courier_common::types::QueueMessage;

/// Parse a raw delivery body into a [`QueueMessage`].
///
/// Unknown fields are ignored. An empty recipient list decodes fine and is
/// rejected later by the provider so that the attempt still gets logged.
pub fn decode(payload: &[u8]) -> Result<QueueMessage, DecodeError> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{FixedOffset, TimeZone};
    use courier_common::types::EmailMessage;

    use super::*;

    fn full_message() -> QueueMessage {
        QueueMessage {
            email: EmailMessage {
                to: vec!["a@x.com".to_string(), "b@x.com".to_string()],
                subject: "Welcome".to_string(),
                body_html: Some("<p>Hi</p>".to_string()),
                body_text: Some("Hi".to_string()),
                from: Some("team@x.com".to_string()),
            },
            priority: "high".to_string(),
            metadata: Some(HashMap::from([(
                "campaign".to_string(),
                "onboarding".to_string(),
            )])),
            timestamp: FixedOffset::east_opt(2 * 3600)
                .unwrap()
                .with_ymd_and_hms(2024, 3, 1, 14, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_decode_preserves_every_field() {
        let message = full_message();
        let payload = serde_json::to_vec(&message).unwrap();
        assert_eq!(decode(&payload).unwrap(), message);
    }

    #[test]
    fn test_decode_minimal_envelope() {
        let payload = br#"{
            "email": {"to": ["a@x.com"], "subject": "S", "body_text": "hi"},
            "priority": "normal",
            "timestamp": "2024-03-01T12:30:00Z"
        }"#;

        let message = decode(payload).unwrap();
        assert_eq!(message.email.to, vec!["a@x.com"]);
        assert_eq!(message.email.text(), Some("hi"));
        assert!(message.email.body_html.is_none());
        assert!(message.email.from.is_none());
        assert!(message.metadata.is_none());
    }

    #[test]
    fn test_decode_keeps_producer_offset() {
        let payload = br#"{
            "email": {"to": ["a@x.com"], "subject": "S", "body_text": "hi"},
            "priority": "normal",
            "timestamp": "2024-03-01T14:30:00+02:00"
        }"#;

        let message = decode(payload).unwrap();
        assert_eq!(message.timestamp.offset().local_minus_utc(), 2 * 3600);

        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(encoded["timestamp"], "2024-03-01T14:30:00+02:00");
    }

    #[test]
    fn test_decode_accepts_empty_recipient_list() {
        let payload = br#"{
            "email": {"to": [], "subject": "S", "body_text": "hi"},
            "priority": "normal",
            "timestamp": "2024-03-01T12:30:00Z"
        }"#;
        assert!(decode(payload).unwrap().email.to.is_empty());
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        assert!(matches!(decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(decode(b"").is_err());
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let payload = serde_json::to_vec(&full_message()).unwrap();
        assert!(decode(&payload[..payload.len() / 2]).is_err());
    }

    #[test]
    fn test_decode_rejects_missing_required_fields() {
        let cases: [&[u8]; 5] = [
            br#"{"priority": "n", "timestamp": "2024-03-01T12:30:00Z"}"#,
            br#"{"email": {"subject": "S"}, "priority": "n", "timestamp": "2024-03-01T12:30:00Z"}"#,
            br#"{"email": {"to": ["a@x.com"]}, "priority": "n", "timestamp": "2024-03-01T12:30:00Z"}"#,
            br#"{"email": {"to": ["a@x.com"], "subject": "S"}, "timestamp": "2024-03-01T12:30:00Z"}"#,
            br#"{"email": {"to": ["a@x.com"], "subject": "S"}, "priority": "n"}"#,
        ];

        for payload in cases {
            assert!(
                decode(payload).is_err(),
                "expected failure for {}",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        let payload = br#"{
            "email": {"to": "a@x.com", "subject": "S"},
            "priority": "normal",
            "timestamp": "2024-03-01T12:30:00Z"
        }"#;
        assert!(decode(payload).is_err());

        let payload = br#"{
            "email": {"to": ["a@x.com"], "subject": "S"},
            "priority": "normal",
            "timestamp": "yesterday"
        }"#;
        assert!(decode(payload).is_err());
    }
}
