//! Federated identity lookup.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{FederationError, FederationResult};
use crate::provider::IdentityProvider;
use crate::token::{AdminToken, DelegatedToken};

/// One identity link as returned by the administrative API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Alias of the linked provider (e.g. "google").
    pub identity_provider: String,
    /// User id at the linked provider.
    pub user_id: String,
    /// User name at the linked provider.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Stored provider token, if token storage is enabled for the link.
    #[serde(default)]
    token: Option<String>,
}

/// Token response as stored by the identity provider for a brokered login.
#[derive(Debug, Deserialize)]
struct StoredTokenEnvelope {
    access_token: String,
    #[serde(default, rename = "accessTokenExpiration")]
    access_token_expiration: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// A user's link to the target mail provider, with its delegated token.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    /// Provider alias.
    pub provider: String,
    /// User id at the provider.
    pub external_user_id: String,
    /// User name at the provider.
    pub user_name: Option<String>,
    /// Delegated access token for the provider's API.
    pub token: DelegatedToken,
}

impl FederatedIdentity {
    /// Expiry of the delegated token, if known.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token.expires_at
    }
}

/// Resolves a user's linked identity for one configured provider.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    provider: IdentityProvider,
    target_provider: String,
    http_client: Client,
}

impl IdentityResolver {
    /// Creates a resolver selecting links to `target_provider`.
    #[must_use]
    pub fn new(provider: IdentityProvider, target_provider: impl Into<String>) -> Self {
        Self {
            provider,
            target_provider: target_provider.into(),
            http_client: Client::new(),
        }
    }

    /// Sets the HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Looks up `user_id`'s links and returns the one for the target provider.
    ///
    /// # Errors
    ///
    /// Returns [`FederationError::IdentityLookupFailed`] if the administrative
    /// API is unreachable, rejects the request or returns an unreadable body,
    /// and [`FederationError::NoLinkedIdentity`] if no link matches.
    pub async fn resolve(
        &self,
        user_id: &str,
        admin_token: &AdminToken,
    ) -> FederationResult<FederatedIdentity> {
        let records = self.list_identities(user_id, admin_token).await?;
        debug!(user_id = %user_id, links = records.len(), "Fetched federated identities");
        select_identity(records, &self.target_provider)
    }

    /// Fetches every identity linked to `user_id`, in provider order.
    ///
    /// # Errors
    ///
    /// Returns [`FederationError::IdentityLookupFailed`] on any failure.
    pub async fn list_identities(
        &self,
        user_id: &str,
        admin_token: &AdminToken,
    ) -> FederationResult<Vec<IdentityRecord>> {
        let url = self.provider.federated_identity_url(user_id);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(admin_token.expose())
            .send()
            .await
            .map_err(|e| {
                lookup_failed(e.status().map(|s| s.as_u16()), e.without_url().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(lookup_failed(Some(status.as_u16()), status.to_string()));
        }

        response
            .json()
            .await
            .map_err(|e| {
                let reason = format!("invalid identity list: {}", e.without_url());
                lookup_failed(Some(status.as_u16()), reason)
            })
    }
}

fn lookup_failed(status: Option<u16>, reason: String) -> FederationError {
    FederationError::IdentityLookupFailed { status, reason }
}

/// Picks the first record for `target` and extracts its delegated token.
fn select_identity(
    records: Vec<IdentityRecord>,
    target: &str,
) -> FederationResult<FederatedIdentity> {
    let record = records
        .into_iter()
        .find(|r| r.identity_provider == target)
        .ok_or_else(|| FederationError::NoLinkedIdentity {
            provider: target.to_string(),
        })?;

    let stored = record
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| lookup_failed(None, format!("link to '{target}' carries no stored token")))?;

    Ok(FederatedIdentity {
        provider: record.identity_provider,
        external_user_id: record.user_id,
        user_name: record.user_name,
        token: unwrap_stored_token(stored),
    })
}

/// The stored value is either a bare access token or the provider's JSON
/// token response. Only the envelope is read; the access token itself is
/// passed through untouched.
fn unwrap_stored_token(stored: String) -> DelegatedToken {
    if stored.trim_start().starts_with('{')
        && let Ok(envelope) = serde_json::from_str::<StoredTokenEnvelope>(&stored)
    {
        let token = DelegatedToken::new(envelope.access_token);
        let expiry = envelope
            .access_token_expiration
            .or(envelope.expires_at)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        return match expiry {
            Some(exp) => token.with_expires_at(exp),
            None => token,
        };
    }

    DelegatedToken::new(stored)
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

    fn records(json: &str) -> Vec<IdentityRecord> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_selects_target_provider() {
        let list = records(
            r#"[
                {"identityProvider": "github", "userId": "gh-1", "userName": "octo", "token": "gh-token"},
                {"identityProvider": "google", "userId": "g-1", "userName": "alice@gmail.com", "token": "ya29.first"},
                {"identityProvider": "google", "userId": "g-2", "userName": "alice2@gmail.com", "token": "ya29.second"}
            ]"#,
        );

        let identity = select_identity(list, "google").unwrap();
        assert_eq!(identity.provider, "google");
        assert_eq!(identity.external_user_id, "g-1");
        assert_eq!(identity.token.expose(), "ya29.first");
        assert!(identity.expires_at().is_none());
    }

    #[test]
    fn test_no_matching_provider() {
        let list = records(r#"[{"identityProvider": "github", "userId": "gh-1", "token": "t"}]"#);
        let err = select_identity(list, "google").unwrap_err();
        assert_eq!(
            err,
            FederationError::NoLinkedIdentity {
                provider: "google".into()
            }
        );

        let err = select_identity(Vec::new(), "google").unwrap_err();
        assert!(matches!(err, FederationError::NoLinkedIdentity { .. }));
    }

    #[test]
    fn test_provider_match_is_exact() {
        let list = records(r#"[{"identityProvider": "Google", "userId": "g", "token": "t"}]"#);
        assert!(matches!(
            select_identity(list, "google"),
            Err(FederationError::NoLinkedIdentity { .. })
        ));
    }

    #[test]
    fn test_missing_stored_token() {
        let list = records(r#"[{"identityProvider": "google", "userId": "g-1"}]"#);
        let err = select_identity(list, "google").unwrap_err();
        assert!(matches!(err, FederationError::IdentityLookupFailed { status: None, .. }));
    }

    #[test]
    fn test_stored_envelope_unwrapped() {
        let token = unwrap_stored_token(
            r#"{"access_token":"ya29.inner","expires_in":3599,"token_type":"Bearer","accessTokenExpiration":4102444800}"#
                .to_string(),
        );
        assert_eq!(token.expose(), "ya29.inner");
        assert_eq!(token.expires_at.unwrap().timestamp(), 4102444800);
    }

    #[test]
    fn test_bare_token_passed_through() {
        let token = unwrap_stored_token("ya29.bare".to_string());
        assert_eq!(token.expose(), "ya29.bare");
        assert!(token.expires_at.is_none());

        // Looks like JSON but is not an envelope: kept verbatim
        let token = unwrap_stored_token("{not json".to_string());
        assert_eq!(token.expose(), "{not json");
    }
}
