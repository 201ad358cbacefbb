//! # heymail-oauth
//!
//! Identity plumbing for delegated mail access.
//!
//! ## Features
//!
//! - **Bearer validation**: signature, expiry and issuer checks against the
//!   identity provider's published key set, with refresh on unknown key ids
//! - **Admin tokens**: client-credentials grant with a short-lived cache
//! - **Federated identities**: lookup of a user's linked provider account and
//!   the delegated token stored with it
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use heymail_oauth::{
//!     AdminTokenBroker, IdentityProvider, IdentityResolver, OAuthClient, SigningKeySet,
//!     TokenValidator, bearer_token,
//! };
//!
//! let provider = IdentityProvider::keycloak("https://sso.example.com", "heymail")?;
//! let keys = Arc::new(SigningKeySet::new(provider.certs_url.clone()));
//! let validator = TokenValidator::for_provider(&provider, keys);
//!
//! let token = validator.validate(bearer_token(Some(header))?).await?;
//!
//! let broker = AdminTokenBroker::new(OAuthClient::new("backend", secret, provider.clone()));
//! let resolver = IdentityResolver::new(provider, "google");
//! let identity = resolver.resolve(&token.subject, &broker.admin_token().await?).await?;
//! // identity.token is the Gmail access token
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod identity;
pub mod jwks;
pub mod provider;
pub mod token;
mod validator;

pub use error::{AuthError, AuthResult, ConfigError, FederationError, FederationResult};
pub use flow::{AdminTokenBroker, OAuthClient};
pub use identity::{FederatedIdentity, IdentityRecord, IdentityResolver};
pub use jwks::SigningKeySet;
pub use provider::IdentityProvider;
pub use token::{AccessToken, AdminToken, DelegatedToken};
pub use validator::{TokenValidator, bearer_token};
