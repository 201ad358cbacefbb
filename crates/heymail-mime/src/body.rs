//! Display body extraction from a part tree.
//!
//! The selection policy is fixed:
//!
//! 1. A root without children yields its own payload, or empty text.
//! 2. Otherwise the first `text/html` descendant in document order wins,
//!    wherever it sits in the tree.
//! 3. Failing that, the first `text/plain` descendant.
//! 4. Failing both, [`UNPARSEABLE_BODY`].
//!
//! A candidate whose payload cannot be decoded is skipped and the search
//! continues with the next one.

use crate::content_type::ContentType;
use crate::encoding::decode_base64url_text;
use crate::part::MimePart;
use tracing::debug;

/// Body returned when no usable text part exists.
///
/// Never empty, so callers can tell it apart from a genuinely empty message.
pub const UNPARSEABLE_BODY: &str = "Could not parse email body.";

/// Extracts a single human-readable body from a part tree.
///
/// This never fails; undecodable content degrades to [`UNPARSEABLE_BODY`].
#[must_use]
pub fn extract_body(root: &MimePart) -> String {
    if root.is_leaf() {
        return root.data().map_or_else(String::new, |data| {
            decode_base64url_text(data).unwrap_or_else(|e| {
                debug!(mime_type = %root.mime_type, "Single-part body not decodable: {e}");
                UNPARSEABLE_BODY.to_string()
            })
        });
    }

    find_text(&root.parts, &ContentType::text_html())
        .or_else(|| find_text(&root.parts, &ContentType::text_plain()))
        .unwrap_or_else(|| UNPARSEABLE_BODY.to_string())
}

/// Pre-order search for the first decodable part of the wanted type.
fn find_text(parts: &[MimePart], wanted: &ContentType) -> Option<String> {
    for part in parts {
        if part.has_type(wanted)
            && let Some(data) = part.data()
        {
            match decode_base64url_text(data) {
                Ok(text) => return Some(text),
                Err(e) => {
                    debug!(
                        part_id = ?part.part_id,
                        mime_type = %part.mime_type,
                        "Skipping undecodable part: {e}"
                    );
                }
            }
        }

        if let Some(text) = find_text(&part.parts, wanted) {
            return Some(text);
        }
    }

    None
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
    use crate::encoding::encode_base64url;

    fn text(mime: &str, s: &str) -> MimePart {
        MimePart::leaf(mime, encode_base64url(s.as_bytes()))
    }

    #[test]
    fn test_single_part_body() {
        let root = text("text/plain", "Hello World");
        assert_eq!(extract_body(&root), "Hello World");
    }

    #[test]
    fn test_single_part_without_payload_is_empty() {
        assert_eq!(extract_body(&MimePart::new("text/plain")), "");
    }

    #[test]
    fn test_single_part_unparseable() {
        let root = MimePart::leaf("text/plain", "QUJDR");
        assert_eq!(extract_body(&root), UNPARSEABLE_BODY);
    }

    #[test]
    fn test_html_beats_shallower_plain() {
        let root = MimePart::container(
            "multipart/mixed",
            vec![
                text("text/plain", "plain at depth 1"),
                MimePart::container(
                    "multipart/alternative",
                    vec![text("text/html", "<p>html at depth 2</p>")],
                ),
            ],
        );

        assert_eq!(extract_body(&root), "<p>html at depth 2</p>");
    }

    #[test]
    fn test_first_plain_in_document_order() {
        let root = MimePart::container(
            "multipart/mixed",
            vec![
                MimePart::container(
                    "multipart/alternative",
                    vec![text("text/plain", "first")],
                ),
                text("text/plain", "second"),
            ],
        );

        assert_eq!(extract_body(&root), "first");
    }

    #[test]
    fn test_no_payload_anywhere_is_sentinel() {
        let root = MimePart::container(
            "multipart/alternative",
            vec![MimePart::new("text/plain"), MimePart::new("text/html")],
        );

        let body = extract_body(&root);
        assert_eq!(body, UNPARSEABLE_BODY);
        assert!(!body.is_empty());
    }

    #[test]
    fn test_undecodable_candidate_skipped() {
        let root = MimePart::container(
            "multipart/alternative",
            vec![
                MimePart::leaf("text/html", "QUJDR"),
                text("text/html", "<i>second html</i>"),
                text("text/plain", "plain"),
            ],
        );

        assert_eq!(extract_body(&root), "<i>second html</i>");
    }

    #[test]
    fn test_falls_back_to_plain_when_html_broken() {
        let root = MimePart::container(
            "multipart/alternative",
            vec![MimePart::leaf("text/html", "!!!"), text("text/plain", "plain")],
        );

        assert_eq!(extract_body(&root), "plain");
    }

    #[test]
    fn test_attachments_ignored() {
        let root = MimePart::container(
            "multipart/mixed",
            vec![
                text("application/pdf", "%PDF-1.4"),
                text("text/plain", "see attached"),
            ],
        );

        assert_eq!(extract_body(&root), "see attached");
    }

    #[test]
    fn test_tree_not_mutated() {
        let root = MimePart::container(
            "multipart/alternative",
            vec![text("text/plain", "a"), text("text/html", "b")],
        );
        let before = root.clone();
        let _ = extract_body(&root);
        assert_eq!(root, before);
    }
}
