//! Error types for token validation and identity federation.
//!
//! An [`AuthError`] means the caller's own credential was rejected. A
//! [`FederationError`] means the credential was fine but an upstream
//! dependency failed. No variant carries a token or a client secret.

/// Result type alias for validation operations.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Result type alias for federation operations.
pub type FederationResult<T> = std::result::Result<T, FederationError>;

/// Inbound bearer token rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No bearer credential was presented.
    #[error("No token provided")]
    NoToken,

    /// Header or claims could not be parsed.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Key id absent from the key set even after a refresh.
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// The key set endpoint could not be read.
    #[error("Failed to fetch signing keys: {0}")]
    KeyFetchFailed(String),

    /// Cryptographic verification failed.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// Expiry claim is in the past.
    #[error("Token expired")]
    Expired,

    /// Issuer or audience did not match the configured values.
    #[error("Invalid token claim: {0}")]
    InvalidClaim(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidClaim("issuer".into()),
            ErrorKind::InvalidAudience => Self::InvalidClaim("audience".into()),
            ErrorKind::ImmatureSignature => Self::InvalidClaim("not before".into()),
            _ => Self::MalformedToken(err.to_string()),
        }
    }
}

/// Upstream failures while brokering delegated access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FederationError {
    /// Client-credentials exchange was rejected or unreachable.
    #[error("Admin authentication failed{}: {reason}", fmt_status(.status))]
    AdminAuthFailed {
        /// Upstream HTTP status, if a response was received.
        status: Option<u16>,
        /// Error code or transport description.
        reason: String,
    },

    /// Administrative identity lookup was rejected or unreachable.
    #[error("Identity lookup failed{}: {reason}", fmt_status(.status))]
    IdentityLookupFailed {
        /// Upstream HTTP status, if a response was received.
        status: Option<u16>,
        /// Error code or transport description.
        reason: String,
    },

    /// The user has no identity linked to the target provider.
    #[error("No linked identity for provider '{provider}'")]
    NoLinkedIdentity {
        /// Provider name that was searched for.
        provider: String,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl FederationError {
    /// Returns the upstream HTTP status, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::AdminAuthFailed { status, .. } | Self::IdentityLookupFailed { status, .. } => {
                *status
            }
            Self::NoLinkedIdentity { .. } => None,
        }
    }
}

/// Invalid static configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
