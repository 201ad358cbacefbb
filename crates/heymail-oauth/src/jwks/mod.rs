//! Signing key set cache.
//!
//! Keys are fetched from the provider's published JWKS and indexed by key id.
//! A lookup miss triggers one refresh, so a freshly rotated key is picked up
//! without a restart. Refreshes replace the whole set; concurrent refreshes
//! are serialized and the last completed one wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Raw JWKS document. Keys are parsed one by one so a single unsupported
/// entry does not poison the whole set.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

type KeyMap = HashMap<String, Arc<DecodingKey>>;

/// Process-wide cache of verification keys.
pub struct SigningKeySet {
    certs_url: Url,
    http_client: Client,
    keys: RwLock<Arc<KeyMap>>,
    refresh_lock: Mutex<()>,
}

impl SigningKeySet {
    /// Creates an empty key set backed by the given JWKS endpoint.
    #[must_use]
    pub fn new(certs_url: Url) -> Self {
        Self {
            certs_url,
            http_client: Client::new(),
            keys: RwLock::new(Arc::new(HashMap::new())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Sets the HTTP client used for fetching.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Returns the cached key for `kid`, without fetching.
    pub async fn get(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Number of cached keys.
    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }

    /// Returns the key for `kid`, refreshing the set once on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFetchFailed`] if the refresh fails and
    /// [`AuthError::UnknownKey`] if the key is still absent afterwards.
    pub async fn get_or_refresh(&self, kid: &str) -> AuthResult<Arc<DecodingKey>> {
        if let Some(key) = self.get(kid).await {
            return Ok(key);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another request may have completed a refresh while we waited.
        if let Some(key) = self.get(kid).await {
            return Ok(key);
        }

        debug!(kid = %kid, "Signing key not cached, refreshing key set");
        let refreshed = self.fetch().await?;
        let key = refreshed.get(kid).cloned();
        *self.keys.write().await = Arc::new(refreshed);

        key.ok_or_else(|| AuthError::UnknownKey(kid.to_string()))
    }

    async fn fetch(&self) -> AuthResult<KeyMap> {
        debug!(url = %self.certs_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(self.certs_url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))?;

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| AuthError::KeyFetchFailed(e.to_string()))?;

        Ok(parse_keys(document.keys))
    }
}

impl fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeySet")
            .field("certs_url", &self.certs_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Builds the key map, skipping encryption keys, keys without an id and
/// entries that are not usable verification keys.
fn parse_keys(raw: Vec<serde_json::Value>) -> KeyMap {
    let mut keys = HashMap::new();

    for value in raw {
        let jwk: Jwk = match serde_json::from_value(value) {
            Ok(jwk) => jwk,
            Err(e) => {
                warn!("Ignoring unparseable JWK: {e}");
                continue;
            }
        };

        if matches!(
            jwk.common.public_key_use,
            Some(PublicKeyUse::Encryption | PublicKeyUse::Other(_))
        ) {
            continue;
        }

        let Some(kid) = jwk.common.key_id.clone() else {
            debug!("Ignoring JWK without key id");
            continue;
        };

        match DecodingKey::from_jwk(&jwk) {
            Ok(key) => {
                keys.insert(kid, Arc::new(key));
            }
            Err(e) => warn!(kid = %kid, "Ignoring unusable JWK: {e}"),
        }
    }

    keys
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const MODULUS: &str = "iZKy1joPbO-d1iur9PPRGFKVvVyTSjFCpiAYVC4L_kTk0inGW8iQuWFUIE9Tc0p3b1zdVOpSvLskITmrfyYIbOPB0SyK2Tk-8JdVcQnzWYVRW1-nOL4LhPAq2jh8msNEoaIcb8GxX21zpj_EmFsTp4VrI0at7awbxmIFi6vbUJ4xmMBXf98LCd2B4FRRhlnmXIxvkju9yPGxjZdwUtsWIdbWrqVpkTiO9ogfKM0FkLc13l_qbnFtiS5yaTnuDxQM8Cipcu-rs4vOWGI1glfvHGEEZpr-y09jCKa0S0_kISa8Reje_yRvgqNTDrLcDArJSuCD1qreKu0eiocFbzKvlw";

    #[test]
    fn test_parse_keys_filters_entries() {
        let keys = parse_keys(vec![
            json!({"kid": "sig", "kty": "RSA", "use": "sig", "n": MODULUS, "e": "AQAB"}),
            json!({"kid": "enc", "kty": "RSA", "use": "enc", "n": MODULUS, "e": "AQAB"}),
            json!({"kty": "RSA", "use": "sig", "n": MODULUS, "e": "AQAB"}),
            json!({"kid": "junk", "kty": "nonsense"}),
            json!({"kid": "implicit", "kty": "RSA", "n": MODULUS, "e": "AQAB"}),
        ]);

        let mut kids: Vec<_> = keys.keys().cloned().collect();
        kids.sort();
        assert_eq!(kids, vec!["implicit", "sig"]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_failure() {
        let set = SigningKeySet::new(Url::parse("http://127.0.0.1:9/certs").unwrap());
        let Err(err) = set.get_or_refresh("any").await else {
            panic!("unreachable endpoint yielded a key");
        };
        assert!(matches!(err, AuthError::KeyFetchFailed(_)));
        assert!(set.is_empty().await);
    }
}
