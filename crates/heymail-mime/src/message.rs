//! Outgoing message composition.

use crate::content_type::ContentType;
use crate::encoding::{encode_base64url, encode_rfc2047};
use crate::header::Headers;

/// A plain-text message to be handed to a provider's send endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl OutgoingMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Renders the message as RFC 5322 text with CRLF line endings.
    #[must_use]
    pub fn to_rfc5322(&self) -> String {
        let mut headers = Headers::new();
        headers.set("To", strip_line_breaks(&self.to));
        headers.set("Subject", encode_rfc2047(&strip_line_breaks(&self.subject), "utf-8"));
        headers.set("MIME-Version", "1.0");
        headers.set("Content-Type", ContentType::text_plain().to_string());
        headers.set("Content-Transfer-Encoding", "8bit");

        let body = self.body.replace("\r\n", "\n").replace('\n', "\r\n");
        format!("{headers}\r\n{body}")
    }

    /// Renders the message and encodes it as unpadded URL-safe Base64.
    #[must_use]
    pub fn to_raw(&self) -> String {
        encode_base64url(self.to_rfc5322().as_bytes())
    }
}

// Header values must not be able to inject further headers.
fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encoding::decode_base64url_text;

    #[test]
    fn test_rfc5322_layout() {
        let message = OutgoingMessage::new("bob@example.com", "Lunch", "Noon?\nOk");
        let text = message.to_rfc5322();

        assert!(text.contains("To: bob@example.com\r\n"));
        assert!(text.contains("Subject: Lunch\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(text.ends_with("\r\n\r\nNoon?\r\nOk"));
    }

    #[test]
    fn test_non_ascii_subject_encoded() {
        let message = OutgoingMessage::new("bob@example.com", "Héllo", "");
        assert!(message.to_rfc5322().contains("Subject: =?utf-8?B?SMOpbGxv?=\r\n"));
    }

    #[test]
    fn test_header_injection_neutralised() {
        let message = OutgoingMessage::new("bob@example.com\r\nBcc: eve@example.com", "x", "");
        let text = message.to_rfc5322();
        assert!(!text.contains("\r\nBcc:"));
    }

    #[test]
    fn test_raw_is_unpadded_base64url() {
        let message = OutgoingMessage::new("bob@example.com", "Hi", "Body");
        let raw = message.to_raw();

        assert!(!raw.contains('='));
        assert!(!raw.contains('+'));
        assert!(!raw.contains('/'));
        assert_eq!(decode_base64url_text(&raw).unwrap(), message.to_rfc5322());
    }
}
