//! # heymail-mime
//!
//! MIME part tree model and display body extraction for provider message
//! payloads.
//!
//! ## Features
//!
//! - **Part tree**: [`MimePart`] mirrors the recursive structure providers
//!   return for a message (deserializable with the default `serde` feature)
//! - **Body extraction**: [`extract_body`] picks one readable body, preferring
//!   HTML over plain text, and never fails
//! - **Encoding**: URL-safe Base64 with padding restoration, RFC 2047 header
//!   encoding
//! - **Composition**: [`OutgoingMessage`] renders plain-text messages for
//!   provider send endpoints
//!
//! ## Quick Start
//!
//! ```ignore
//! use heymail_mime::{MimePart, extract_body};
//!
//! let payload: MimePart = serde_json::from_value(message["payload"].clone())?;
//! println!("{}", extract_body(&payload));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod body;
mod content_type;
mod error;
mod header;
mod message;
mod part;

pub mod encoding;

pub use body::{UNPARSEABLE_BODY, extract_body};
pub use content_type::ContentType;
pub use error::{DecodeError, Result};
pub use header::{Header, Headers};
pub use message::OutgoingMessage;
pub use part::{MimePart, PartBody};
