//! Service credential flows against the identity provider.

mod broker;

pub use broker::AdminTokenBroker;

use crate::error::{FederationError, FederationResult};
use crate::provider::IdentityProvider;
use crate::token::{AdminToken, ErrorResponse, TokenResponse};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use tracing::debug;

/// Confidential client registered at the identity provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret.
    client_secret: SecretString,
    /// Provider configuration.
    pub provider: IdentityProvider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new confidential client.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        provider: IdentityProvider,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Performs the client-credentials grant.
    ///
    /// # Errors
    ///
    /// Returns [`FederationError::AdminAuthFailed`] on transport failure, a
    /// non-success status, or an unreadable response body.
    pub async fn client_credentials(&self) -> FederationResult<AdminToken> {
        let mut params = HashMap::new();
        params.insert("grant_type", "client_credentials");
        params.insert("client_id", self.client_id.as_str());
        params.insert("client_secret", self.client_secret.expose_secret());

        debug!(
            client_id = %self.client_id,
            url = %self.provider.token_url,
            "Requesting admin token"
        );

        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| FederationError::AdminAuthFailed {
                status: e.status().map(|s| s.as_u16()),
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ErrorResponse>()
                .await
                .map_or_else(|_| status.to_string(), |err| err.reason());
            return Err(FederationError::AdminAuthFailed {
                status: Some(status.as_u16()),
                reason,
            });
        }

        let token_response: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| FederationError::AdminAuthFailed {
                    status: Some(status.as_u16()),
                    reason: format!("invalid token response: {}", e.without_url()),
                })?;

        Ok(AdminToken::from_response(token_response))
    }
}
