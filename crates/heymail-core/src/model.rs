//! Mail provider message shapes and the normalized email record.

use chrono::{DateTime, TimeZone, Utc};
use heymail_mime::{MimePart, extract_body};
use serde::{Deserialize, Serialize};

/// Subject used when a message has no `Subject` header.
pub const DEFAULT_SUBJECT: &str = "No Subject";

/// Sender used when a message has no `From` header.
pub const DEFAULT_SENDER: &str = "Unknown Sender";

/// Label marking a message as unread.
pub const UNREAD_LABEL: &str = "UNREAD";

/// Reference to a message in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Message id.
    pub id: String,
    /// Thread id.
    #[serde(default)]
    pub thread_id: String,
}

/// A full message as returned by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderMessage {
    /// Message id.
    pub id: String,
    /// Thread id.
    pub thread_id: String,
    /// Labels currently applied.
    pub label_ids: Vec<String>,
    /// Receipt time in epoch milliseconds, as a decimal string.
    pub internal_date: Option<String>,
    /// Root of the part tree, carrying the top-level headers.
    pub payload: Option<MimePart>,
}

impl ProviderMessage {
    /// Looks up a top-level header, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.header(name))
    }

    /// Whether the message is still unread.
    #[must_use]
    pub fn is_unread(&self) -> bool {
        self.label_ids.iter().any(|l| l == UNREAD_LABEL)
    }
}

/// Display-ready email, the only record exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEmail {
    /// Message id.
    pub id: String,
    /// Thread id.
    pub thread_id: String,
    /// Subject line.
    pub subject: String,
    /// Raw `From` header.
    pub sender: String,
    /// Decoded body text.
    pub body: String,
    /// Sent or received time.
    pub date: DateTime<Utc>,
    /// Whether the message has been read.
    pub read: bool,
}

impl NormalizedEmail {
    /// Normalizes a provider message, using the current time as the last
    /// resort date.
    #[must_use]
    pub fn from_message(message: &ProviderMessage) -> Self {
        Self::from_message_at(message, Utc::now())
    }

    /// Normalizes a provider message with an explicit fallback time.
    #[must_use]
    pub fn from_message_at(message: &ProviderMessage, now: DateTime<Utc>) -> Self {
        let date = message
            .header("Date")
            .and_then(parse_date_header)
            .or_else(|| message.internal_date.as_deref().and_then(parse_internal_date))
            .unwrap_or(now);

        Self {
            id: message.id.clone(),
            thread_id: message.thread_id.clone(),
            subject: non_blank(message.header("Subject")).unwrap_or(DEFAULT_SUBJECT).to_string(),
            sender: non_blank(message.header("From")).unwrap_or(DEFAULT_SENDER).to_string(),
            body: message.payload.as_ref().map(extract_body).unwrap_or_default(),
            date,
            read: !message.is_unread(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parses an RFC 2822 date, tolerating a trailing zone comment such as
/// `(UTC)`.
fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = match value.rfind('(') {
        Some(start) if value.ends_with(')') => value[..start].trim_end(),
        _ => value,
    };

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_internal_date(value: &str) -> Option<DateTime<Utc>> {
    let millis = value.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use heymail_mime::UNPARSEABLE_BODY;

    fn message(json: &str) -> ProviderMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_normalize_full_message() {
        let msg = message(
            r#"{
                "id": "18c1",
                "threadId": "18c0",
                "labelIds": ["INBOX", "UNREAD"],
                "internalDate": "1700000000000",
                "payload": {
                    "mimeType": "multipart/alternative",
                    "headers": [
                        {"name": "subject", "value": "Quarterly report"},
                        {"name": "FROM", "value": "Bob <bob@example.com>"},
                        {"name": "Date", "value": "Tue, 2 Jan 2024 03:04:05 +0100"}
                    ],
                    "parts": [
                        {"mimeType": "text/plain", "body": {"size": 2, "data": "aGk"}},
                        {"mimeType": "text/html", "body": {"size": 9, "data": "PGI-aGk8L2I-"}}
                    ]
                }
            }"#,
        );

        let email = NormalizedEmail::from_message(&msg);
        assert_eq!(email.id, "18c1");
        assert_eq!(email.thread_id, "18c0");
        assert_eq!(email.subject, "Quarterly report");
        assert_eq!(email.sender, "Bob <bob@example.com>");
        assert_eq!(email.body, "<b>hi</b>");
        assert_eq!(email.date, Utc.with_ymd_and_hms(2024, 1, 2, 2, 4, 5).unwrap());
        assert!(!email.read);
    }

    #[test]
    fn test_defaults_for_missing_headers() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let msg = message(r#"{"id": "a", "threadId": "t", "labelIds": ["INBOX"]}"#);

        let email = NormalizedEmail::from_message_at(&msg, now);
        assert_eq!(email.subject, DEFAULT_SUBJECT);
        assert_eq!(email.sender, DEFAULT_SENDER);
        assert_eq!(email.body, "");
        assert_eq!(email.date, now);
        assert!(email.read);
    }

    #[test]
    fn test_date_falls_back_to_internal_date() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        let msg = message(
            r#"{
                "id": "a",
                "internalDate": "1700000000000",
                "payload": {"mimeType": "text/plain", "headers": [{"name": "Date", "value": "yesterday-ish"}]}
            }"#,
        );

        let email = NormalizedEmail::from_message_at(&msg, now);
        assert_eq!(email.date.timestamp_millis(), 1700000000000);
    }

    #[test]
    fn test_date_with_zone_comment() {
        let parsed = parse_date_header("Mon, 15 Jan 2024 10:00:00 +0000 (UTC)").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        assert!(parse_date_header("not a date").is_none());
    }

    #[test]
    fn test_unparseable_body_degrades_to_sentinel() {
        let msg = message(
            r#"{
                "id": "a",
                "payload": {
                    "mimeType": "multipart/mixed",
                    "parts": [{"mimeType": "text/plain", "body": {"size": 1, "data": "QUJDR"}}]
                }
            }"#,
        );

        assert_eq!(NormalizedEmail::from_message(&msg).body, UNPARSEABLE_BODY);
    }

    #[test]
    fn test_serialized_shape() {
        let email = NormalizedEmail {
            id: "1".into(),
            thread_id: "2".into(),
            subject: "s".into(),
            sender: "f".into(),
            body: "b".into(),
            date: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            read: true,
        };

        let value = serde_json::to_value(&email).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": "1",
                "threadId": "2",
                "subject": "s",
                "sender": "f",
                "body": "b",
                "date": "2024-01-02T03:04:05Z",
                "read": true
            })
        );
    }
}
