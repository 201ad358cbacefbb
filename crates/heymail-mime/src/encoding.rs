//! Payload encoding and decoding utilities.
//!
//! Provider payloads use the URL-safe base64 alphabet with padding stripped.
//! Decoding restores the standard alphabet and padding first, then applies a
//! strict standard base64 decode so malformed input is rejected rather than
//! truncated.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

/// Encodes data as standard Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as URL-safe Base64 without padding.
///
/// This is the form providers expect for raw message uploads.
#[must_use]
pub fn encode_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Maps the URL-safe alphabet back to the standard one and restores padding.
#[must_use]
pub fn to_standard_alphabet(data: &str) -> String {
    let mut standard: String = data
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    while standard.len() % 4 != 0 {
        standard.push('=');
    }

    standard
}

/// Decodes URL-safe Base64 data, with or without padding.
///
/// # Errors
///
/// Returns [`DecodeError::Unparseable`](crate::DecodeError::Unparseable) if the
/// input is not valid once padding is restored.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(to_standard_alphabet(data))
        .map_err(Into::into)
}

/// Decodes URL-safe Base64 data and interprets the bytes as UTF-8 text.
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
///
/// # Errors
///
/// Returns an error if the Base64 layer is malformed.
pub fn decode_base64url_text(data: &str) -> Result<String> {
    let bytes = decode_base64url(data)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Format: `=?charset?B?encoded-text?=`. ASCII values without `=` or `?`
/// are returned unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && c != '=' && c != '?') {
        return text.to_string();
    }

    let encoded = encode_base64(text.as_bytes());
    format!("=?{charset}?B?{encoded}?=")
}
