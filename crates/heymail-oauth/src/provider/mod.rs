//! Identity provider endpoint configuration.

use crate::error::ConfigError;
use url::Url;

/// Endpoints of the identity provider that issues user tokens.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    /// Realm name.
    pub realm: String,
    /// Expected `iss` claim of user tokens.
    pub issuer: String,
    /// Published JSON Web Key Set.
    pub certs_url: Url,
    /// Token endpoint used for the client-credentials grant.
    pub token_url: Url,
    /// Administrative users collection for the realm.
    pub admin_users_url: Url,
}

impl IdentityProvider {
    /// Keycloak endpoint layout for a realm.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute http(s) URL or the
    /// realm is empty.
    pub fn keycloak(
        base_url: impl AsRef<str>,
        realm: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let base = Url::parse(base_url.as_ref())?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "identity provider base URL must be http(s): {base}"
            )));
        }

        let realm = realm.into();
        if realm.trim().is_empty() {
            return Err(ConfigError::Invalid("realm is empty".into()));
        }

        let realm_url = endpoint(&base, &["realms", &realm]);
        let issuer = realm_url.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            certs_url: endpoint(&base, &["realms", &realm, "protocol", "openid-connect", "certs"]),
            token_url: endpoint(&base, &["realms", &realm, "protocol", "openid-connect", "token"]),
            admin_users_url: endpoint(&base, &["admin", "realms", &realm, "users"]),
            issuer,
            realm,
        })
    }

    /// Federated identity listing for one user.
    ///
    /// The user id is escaped as a single path segment.
    #[must_use]
    pub fn federated_identity_url(&self, user_id: &str) -> Url {
        extend(self.admin_users_url.clone(), &[user_id, "federated-identity"])
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    extend(base.clone(), segments)
}

fn extend(mut url: Url, segments: &[&str]) -> Url {
    // Only cannot-be-a-base URLs refuse segments, and those are rejected in `keycloak`.
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
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

    #[test]
    fn test_keycloak_endpoints() {
        let provider =
            IdentityProvider::keycloak("https://sso.example.com:8082/", "heymail").unwrap();

        assert_eq!(provider.issuer, "https://sso.example.com:8082/realms/heymail");
        assert_eq!(
            provider.certs_url.as_str(),
            "https://sso.example.com:8082/realms/heymail/protocol/openid-connect/certs"
        );
        assert_eq!(
            provider.token_url.as_str(),
            "https://sso.example.com:8082/realms/heymail/protocol/openid-connect/token"
        );
        assert_eq!(
            provider.federated_identity_url("1234-abcd").as_str(),
            "https://sso.example.com:8082/admin/realms/heymail/users/1234-abcd/federated-identity"
        );
    }

    #[test]
    fn test_base_without_trailing_slash() {
        let provider = IdentityProvider::keycloak("http://127.0.0.1:8080", "test").unwrap();
        assert_eq!(provider.issuer, "http://127.0.0.1:8080/realms/test");
    }

    #[test]
    fn test_user_id_escaped() {
        let provider = IdentityProvider::keycloak("https://sso.example.com", "r").unwrap();
        let url = provider.federated_identity_url("../other user");
        assert_eq!(
            url.as_str(),
            "https://sso.example.com/admin/realms/r/users/..%2Fother%20user/federated-identity"
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(IdentityProvider::keycloak("not a url", "r").is_err());
        assert!(IdentityProvider::keycloak("mailto:a@b.c", "r").is_err());
        assert!(IdentityProvider::keycloak("https://sso.example.com", " ").is_err());
    }
}
