//! Cached admin token brokering.

use super::OAuthClient;
use crate::error::FederationResult;
use crate::token::AdminToken;
use tokio::sync::RwLock;
use tracing::debug;

/// Hands out admin tokens, reusing one until it nears expiry.
///
/// Safe to share between concurrent requests. Two requests observing an
/// expired token at the same time may both exchange; whichever stores last
/// is kept.
#[derive(Debug)]
pub struct AdminTokenBroker {
    client: OAuthClient,
    cached: RwLock<Option<AdminToken>>,
}

impl AdminTokenBroker {
    /// Creates a broker with an empty cache.
    #[must_use]
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client,
            cached: RwLock::new(None),
        }
    }

    /// Returns a fresh admin token, exchanging credentials if needed.
    ///
    /// # Errors
    ///
    /// Returns [`FederationError::AdminAuthFailed`](crate::FederationError::AdminAuthFailed)
    /// if the exchange fails.
    pub async fn admin_token(&self) -> FederationResult<AdminToken> {
        if let Some(token) = self.cached.read().await.as_ref().filter(|t| t.is_fresh()) {
            debug!("Reusing cached admin token");
            return Ok(token.clone());
        }

        let token = self.client.client_credentials().await?;
        debug!(expires_at = ?token.expires_at, "Obtained admin token");

        if token.is_fresh() {
            *self.cached.write().await = Some(token.clone());
        }

        Ok(token)
    }

    /// Drops the cached token, forcing the next call to exchange.
    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }
}
