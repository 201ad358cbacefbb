//! Configuration loaded from environment variables.
//!
//! Identity provider settings keep the `KEYCLOAK_*` names; everything else is
//! `HEYMAIL_*` with a default. A `.env` file is honoured by the binary before
//! this module reads anything.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::ConfigError;
use crate::service::GmailClient;

/// Server-wide settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identity provider root, e.g. `https://sso.example.com`.
    pub keycloak_base_url: String,
    /// Realm issuing user tokens.
    pub realm: String,
    /// Confidential client used for admin lookups.
    pub client_id: String,
    /// Secret of that client.
    pub client_secret: SecretString,
    /// Required `aud` claim of user tokens, if any.
    pub audience: Option<String>,
    /// Linked identity provider whose token is used for mail access.
    pub target_provider: String,
    /// Listen address of the HTTP server.
    pub bind_addr: SocketAddr,
    /// Deadline for one inbound request, end to end.
    pub request_timeout: Duration,
    /// Timeout of each outgoing HTTP call.
    pub http_timeout: Duration,
    /// Messages fetched in parallel per listing.
    pub fetch_concurrency: usize,
    /// Size of a listing.
    pub max_results: u32,
    /// Mail provider API root.
    pub gmail_base_url: Url,
}

impl Config {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// is malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// KEYCLOAK_BASE_URL=https://sso.example.com
    /// KEYCLOAK_REALM=heymail
    /// KEYCLOAK_BACKEND_CLIENT_ID=heymail-backend
    /// KEYCLOAK_BACKEND_CLIENT_SECRET=change-me
    /// HEYMAIL_BIND_ADDR=127.0.0.1:3001
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        let gmail_base_url = vars.get("GMAIL_API_BASE_URL");
        let gmail_base_url = gmail_base_url.as_deref().unwrap_or(GmailClient::DEFAULT_BASE_URL);

        Ok(Self {
            keycloak_base_url: vars.required("KEYCLOAK_BASE_URL")?,
            realm: vars.required("KEYCLOAK_REALM")?,
            client_id: vars.required("KEYCLOAK_BACKEND_CLIENT_ID")?,
            client_secret: SecretString::from(vars.required("KEYCLOAK_BACKEND_CLIENT_SECRET")?),
            audience: vars.get("KEYCLOAK_AUDIENCE"),
            target_provider: vars
                .get("HEYMAIL_TARGET_PROVIDER")
                .unwrap_or_else(|| "google".to_owned()),
            bind_addr: vars.parse("HEYMAIL_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3001)))?,
            request_timeout: Duration::from_millis(
                vars.positive("HEYMAIL_REQUEST_TIMEOUT_MS", 15_000)?,
            ),
            http_timeout: Duration::from_millis(vars.positive("HEYMAIL_HTTP_TIMEOUT_MS", 10_000)?),
            fetch_concurrency: usize::try_from(vars.positive("HEYMAIL_FETCH_CONCURRENCY", 5)?)
                .map_err(|e| invalid("HEYMAIL_FETCH_CONCURRENCY", e))?,
            max_results: u32::try_from(vars.positive("HEYMAIL_MAX_RESULTS", 20)?)
                .map_err(|e| invalid("HEYMAIL_MAX_RESULTS", e))?,
            gmail_base_url: parse_http_url("GMAIL_API_BASE_URL", gmail_base_url)?,
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Set and non-blank value, trimmed.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_owned()))
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map_or(Ok(default), |v| v.parse().map_err(|e| invalid(key, e)))
    }

    fn positive(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.parse(key, default)? {
            0 => Err(invalid(key, "must be greater than zero")),
            v => Ok(v),
        }
    }
}

fn invalid(key: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name: key.to_owned(),
        reason: reason.to_string(),
    }
}

fn parse_http_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| invalid(key, e))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(key, "must be an http(s) URL"));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("KEYCLOAK_BASE_URL", "https://sso.example.com"),
        ("KEYCLOAK_REALM", "heymail"),
        ("KEYCLOAK_BACKEND_CLIENT_ID", "backend"),
        ("KEYCLOAK_BACKEND_CLIENT_SECRET", "s3cret"),
    ];

    #[test]
    fn test_defaults() {
        let config = load(REQUIRED).unwrap();

        assert_eq!(config.realm, "heymail");
        assert_eq!(config.client_secret.expose_secret(), "s3cret");
        assert_eq!(config.audience, None);
        assert_eq!(config.target_provider, "google");
        assert_eq!(config.bind_addr, "0.0.0.0:3001".parse().unwrap());
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.fetch_concurrency, 5);
        assert_eq!(config.max_results, 20);
        assert_eq!(config.gmail_base_url.as_str(), "https://gmail.googleapis.com/gmail/v1");
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("KEYCLOAK_AUDIENCE", "heymail-frontend"),
            ("HEYMAIL_BIND_ADDR", "127.0.0.1:8080"),
            ("HEYMAIL_FETCH_CONCURRENCY", " 8 "),
            ("HEYMAIL_MAX_RESULTS", "50"),
            ("GMAIL_API_BASE_URL", "http://127.0.0.1:9999/gmail/v1"),
        ]);

        let config = load(&pairs).unwrap();
        assert_eq!(config.audience.as_deref(), Some("heymail-frontend"));
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.fetch_concurrency, 8);
        assert_eq!(config.max_results, 50);
        assert_eq!(config.gmail_base_url.port(), Some(9999));
    }

    #[test]
    fn test_missing_required() {
        let err = load(&REQUIRED[..3]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing(ref key) if key == "KEYCLOAK_BACKEND_CLIENT_SECRET"
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("KEYCLOAK_REALM", "   ");
        assert!(matches!(load(&pairs), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_malformed_values() {
        for (key, value) in [
            ("HEYMAIL_REQUEST_TIMEOUT_MS", "soon"),
            ("HEYMAIL_FETCH_CONCURRENCY", "0"),
            ("HEYMAIL_MAX_RESULTS", "-3"),
            ("HEYMAIL_BIND_ADDR", "localhost"),
            ("GMAIL_API_BASE_URL", "ftp://example.com"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            let err = load(&pairs).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { ref name, .. } if name == key),
                "{key}={value} gave {err}"
            );
        }
    }
}
