//! Error types for MIME operations.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// MIME decoding error types.
///
/// These never escape a message boundary: body extraction recovers from them
/// and degrades to [`UNPARSEABLE_BODY`](crate::UNPARSEABLE_BODY).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Payload could not be recovered after padding restoration.
    #[error("Unparseable payload: {0}")]
    Unparseable(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),
}

impl From<base64::DecodeError> for DecodeError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Unparseable(err.to_string())
    }
}
