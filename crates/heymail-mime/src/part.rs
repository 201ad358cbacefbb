//! Provider MIME part tree.

use crate::content_type::ContentType;
use crate::header::Header;

/// Inline body of a part as delivered by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct PartBody {
    /// Size of the decoded body in bytes, as reported by the provider.
    pub size: u64,
    /// URL-safe Base64 payload, padding usually stripped.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub data: Option<String>,
    /// Set instead of `data` when the content must be fetched separately.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub attachment_id: Option<String>,
}

/// A node in a message's MIME structure.
///
/// Leaves carry an encoded payload (or nothing); containers carry ordered
/// children. Trees are acyclic by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct MimePart {
    /// Provider-assigned part id (e.g. "0", "1.2").
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub part_id: Option<String>,
    /// Declared mime type, e.g. `text/html` or `multipart/alternative`.
    pub mime_type: String,
    /// Attachment filename, empty for inline parts.
    pub filename: String,
    /// Part headers in provider order.
    pub headers: Vec<Header>,
    /// Inline body, if any.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub body: Option<PartBody>,
    /// Child parts in document order.
    pub parts: Vec<MimePart>,
}

impl MimePart {
    /// Creates an empty part of the given mime type.
    #[must_use]
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            ..Self::default()
        }
    }

    /// Creates a leaf part carrying an encoded payload.
    #[must_use]
    pub fn leaf(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            body: Some(PartBody {
                size: data.len() as u64,
                data: Some(data),
                attachment_id: None,
            }),
            ..Self::new(mime_type)
        }
    }

    /// Creates a container part with the given children.
    #[must_use]
    pub fn container(mime_type: impl Into<String>, parts: Vec<Self>) -> Self {
        Self {
            parts,
            ..Self::new(mime_type)
        }
    }

    /// Gets the first value for a header, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Returns the encoded inline payload when present and non-empty.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }

    /// Returns true if the part has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.parts.is_empty()
    }

    /// Parses the declared mime type, if it is well formed.
    #[must_use]
    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::parse(&self.mime_type).ok()
    }

    /// Checks whether the declared mime type has the same `type/subtype`.
    #[must_use]
    pub fn has_type(&self, wanted: &ContentType) -> bool {
        self.content_type().is_some_and(|ct| ct.same_essence(wanted))
    }
}
