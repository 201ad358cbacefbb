//! Token types.
//!
//! Bearer strings are held in [`SecretString`] so `Debug` output and log
//! fields never reveal them.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Seconds before expiry at which a cached token is considered stale.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// A validated inbound user token's derived claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Subject (user id at the identity provider).
    pub subject: String,
    /// Issuer claim, if present.
    pub issuer: Option<String>,
    /// Key id the signature was verified with.
    pub key_id: String,
    /// Expiry claim.
    pub expires_at: DateTime<Utc>,
}

/// Service-level token from the client-credentials grant.
///
/// Only ever sent to the identity provider's administrative API.
#[derive(Debug, Clone)]
pub struct AdminToken {
    access_token: SecretString,
    /// Expiration time, if the provider reported one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AdminToken {
    /// Creates a new admin token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            expires_at: None,
        }
    }

    /// Creates a token from a token endpoint response.
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(i64::from(secs)));

        Self {
            access_token: SecretString::from(response.access_token),
            expires_at,
        }
    }

    /// Sets the expiration time.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the token can still be reused (expiry known and more than a
    /// minute away).
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| Utc::now() + Duration::seconds(EXPIRY_BUFFER_SECS) < exp)
    }

    /// Returns the bearer string for an outgoing request.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.access_token.expose_secret()
    }
}

/// External provider token embedded in a linked identity.
///
/// Opaque: it is forwarded to the mail provider and never parsed.
#[derive(Debug, Clone)]
pub struct DelegatedToken {
    access_token: SecretString,
    /// Expiration time, if the identity provider stored one.
    pub expires_at: Option<DateTime<Utc>>,
}

impl DelegatedToken {
    /// Creates a new delegated token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            expires_at: None,
        }
    }

    /// Sets the expiration time.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Checks if the stored expiry has passed. Unknown expiry counts as live.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() >= exp)
    }

    /// Returns the bearer string for an outgoing request.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.access_token.expose_secret()
    }
}

/// Token response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Expires in seconds.
    #[serde(default)]
    pub expires_in: Option<u32>,
}

/// Error response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Short diagnostic form: `code - description`.
    #[must_use]
    pub fn reason(&self) -> String {
        if self.error_description.is_empty() {
            self.error.clone()
        } else {
            format!("{} - {}", self.error, self.error_description)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_token_freshness() {
        let stale = AdminToken::new("admin").with_expires_at(Utc::now() + Duration::seconds(30));
        assert!(!stale.is_fresh());

        let fresh = AdminToken::new("admin").with_expires_at(Utc::now() + Duration::seconds(300));
        assert!(fresh.is_fresh());

        // No expiry reported: never reused
        assert!(!AdminToken::new("admin").is_fresh());
    }

    #[test]
    fn test_admin_token_from_response() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","token_type":"Bearer","expires_in":300}"#)
                .unwrap();
        let token = AdminToken::from_response(response);
        assert_eq!(token.expose(), "abc");
        assert!(token.is_fresh());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let admin = AdminToken::new("super-secret-admin");
        let delegated = DelegatedToken::new("super-secret-delegated");

        assert!(!format!("{admin:?}").contains("super-secret-admin"));
        assert!(!format!("{delegated:?}").contains("super-secret-delegated"));
    }

    #[test]
    fn test_delegated_expiry() {
        assert!(!DelegatedToken::new("t").is_expired());
        assert!(
            DelegatedToken::new("t")
                .with_expires_at(Utc::now() - Duration::seconds(1))
                .is_expired()
        );
    }

    #[test]
    fn test_error_response_reason() {
        let err: ErrorResponse = serde_json::from_str(
            r#"{"error":"unauthorized_client","error_description":"Invalid client secret"}"#,
        )
        .unwrap();
        assert_eq!(err.reason(), "unauthorized_client - Invalid client secret");
    }
}
