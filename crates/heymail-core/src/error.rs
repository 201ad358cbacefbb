//! Error types for the core library.

use std::time::Duration;

use heymail_oauth::{AuthError, FederationError};
use thiserror::Error;

/// Errors from the downstream mail provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// The provider could not be reached.
    #[error("Mail provider unreachable: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("Mail provider returned HTTP {status}: {reason}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Provider error message or status text.
        reason: String,
    },

    /// The response body did not have the expected shape.
    #[error("Invalid mail provider response: {0}")]
    InvalidResponse(String),

    /// A message id that cannot name a single message.
    #[error("Invalid message id {0:?}")]
    InvalidMessageId(String),
}

impl MailError {
    /// Request URLs carry message ids, so they are stripped from the text.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        let decode = err.is_decode();
        let text = err.without_url().to_string();
        if decode {
            Self::InvalidResponse(text)
        } else {
            Self::Transport(text)
        }
    }
}

/// How a pipeline failure should be reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller's own credential was rejected.
    Unauthorized,
    /// The request itself was unusable.
    BadRequest,
    /// An upstream dependency failed or refused the request.
    DependencyFailure,
    /// The request deadline passed.
    Timeout,
    /// The request was cancelled before completing.
    Cancelled,
}

/// Errors that can abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Inbound token rejected.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Admin token or identity lookup failed.
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// Mail provider call failed.
    #[error(transparent)]
    Mail(#[from] MailError),

    /// The caller's request was rejected before reaching the provider.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Deadline exceeded.
    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Run aborted by cancellation.
    #[error("Request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Classifies the error for the outer boundary.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Unauthorized,
            Self::InvalidRequest(_) | Self::Mail(MailError::InvalidMessageId(_)) => {
                ErrorKind::BadRequest
            }
            Self::Federation(_) | Self::Mail(_) => ErrorKind::DependencyFailure,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Invalid or missing startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable unset or blank.
    #[error("Missing required environment variable {0}")]
    Missing(String),

    /// Variable set to an unusable value.
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Identity provider endpoints could not be derived.
    #[error(transparent)]
    Provider(#[from] heymail_oauth::ConfigError),
}

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
