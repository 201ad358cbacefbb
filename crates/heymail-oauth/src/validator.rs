//! Inbound bearer token validation.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::jwks::SigningKeySet;
use crate::provider::IdentityProvider;
use crate::token::AccessToken;

/// Asymmetric algorithms accepted for user tokens. Shared-secret algorithms
/// are refused outright since the key set only publishes public keys.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// Returns [`AuthError::NoToken`] when the header is missing or blank and
/// [`AuthError::MalformedToken`] when it is not a bearer credential.
pub fn bearer_token(header: Option<&str>) -> AuthResult<&str> {
    let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(AuthError::NoToken)?;

    let mut parts = header.split_whitespace();
    let scheme = parts.next().unwrap_or_default();
    let token = parts
        .next()
        .ok_or_else(|| AuthError::MalformedToken("missing bearer credential".into()))?;

    if !scheme.eq_ignore_ascii_case("bearer") || parts.next().is_some() {
        return Err(AuthError::MalformedToken("expected 'Bearer <token>'".into()));
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    iss: Option<String>,
    exp: Option<i64>,
}

/// Verifies user tokens against the identity provider's signing keys.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    keys: Arc<SigningKeySet>,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenValidator {
    /// Creates a validator over a shared key set, with no issuer or
    /// audience checks.
    #[must_use]
    pub const fn new(keys: Arc<SigningKeySet>) -> Self {
        Self {
            keys,
            issuer: None,
            audience: None,
        }
    }

    /// Creates a validator for a provider, checking its issuer.
    #[must_use]
    pub fn for_provider(provider: &IdentityProvider, keys: Arc<SigningKeySet>) -> Self {
        Self::new(keys).with_issuer(provider.issuer.clone())
    }

    /// Requires the `iss` claim to equal `issuer`.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Requires the `aud` claim to contain `audience`.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// The key set this validator resolves keys from.
    #[must_use]
    pub fn key_set(&self) -> &SigningKeySet {
        &self.keys
    }

    /// Validates a raw token string.
    ///
    /// Expiry is checked before the key lookup, so an expired token is
    /// reported as [`AuthError::Expired`] whatever its signature.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] describing the first failed check.
    pub async fn validate(&self, token: &str) -> AuthResult<AccessToken> {
        if token.trim().is_empty() {
            return Err(AuthError::NoToken);
        }

        let header = decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(AuthError::MalformedToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AuthError::MalformedToken("missing key id".into()))?;

        let unverified = peek_claims(token, header.alg)?;
        let exp = unverified
            .exp
            .ok_or_else(|| AuthError::MalformedToken("missing exp claim".into()))?;
        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or_else(|| AuthError::MalformedToken("exp claim out of range".into()))?;
        if expires_at <= Utc::now() {
            return Err(AuthError::Expired);
        }

        let key = self.keys.get_or_refresh(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        let claims = decode::<Claims>(token, &key, &validation)?.claims;
        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("empty sub claim".into()))?;

        debug!(subject = %subject, kid = %kid, "Validated bearer token");

        Ok(AccessToken {
            subject,
            issuer: claims.iss,
            key_id: kid,
            expires_at,
        })
    }
}

/// Reads claims without verifying the signature. Used only to reject
/// expired or structurally broken tokens before any key lookup.
fn peek_claims(token: &str, alg: Algorithm) -> AuthResult<Claims> {
    let mut validation = Validation::new(alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::MalformedToken(e.to_string()))
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
    use jsonwebtoken::{EncodingKey, Header, encode};
    use url::Url;

    fn offline_validator() -> TokenValidator {
        let keys = SigningKeySet::new(Url::parse("http://127.0.0.1:9/certs").unwrap());
        TokenValidator::new(Arc::new(keys))
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(bearer_token(Some("bearer  abc")).unwrap(), "abc");
        assert_eq!(bearer_token(None), Err(AuthError::NoToken));
        assert_eq!(bearer_token(Some("   ")), Err(AuthError::NoToken));
        assert!(matches!(bearer_token(Some("Bearer")), Err(AuthError::MalformedToken(_))));
        assert!(matches!(
            bearer_token(Some("Basic dXNlcjpwYXNz")),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(bearer_token(Some("Bearer a b")), Err(AuthError::MalformedToken(_))));
    }

    #[tokio::test]
    async fn test_empty_token() {
        assert_eq!(offline_validator().validate("").await, Err(AuthError::NoToken));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let err = offline_validator().validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn test_symmetric_algorithm_refused() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k".into());
        let token = encode(
            &header,
            &serde_json::json!({"sub": "u", "exp": Utc::now().timestamp() + 600}),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let err = offline_validator().validate(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }
}
