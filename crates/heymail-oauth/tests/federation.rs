//! Integration tests for token validation, admin token brokering and
//! identity lookup.
//!
//! These tests run an in-process mock identity provider on a loopback port
//! and count the requests each endpoint receives.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::SecretString;
use serde_json::{Value, json};

use heymail_oauth::{
    AdminTokenBroker, AuthError, FederationError, IdentityProvider, IdentityResolver, OAuthClient,
    SigningKeySet, TokenValidator,
};

const REALM: &str = "test";
const PRIMARY_PEM: &[u8] = include_bytes!("fixtures/signing_key.pem");
const ROTATED_PEM: &[u8] = include_bytes!("fixtures/rotated_key.pem");
const JWKS: &str = include_str!("fixtures/jwks.json");

/// Mutable behaviour and request counters of the mock provider.
#[derive(Default)]
struct MockState {
    published_keys: Mutex<Vec<Value>>,
    certs_failure: Mutex<Option<CertsFailure>>,
    jwks_hits: AtomicUsize,
    token_hits: AtomicUsize,
    identity_hits: AtomicUsize,
    token_status: Mutex<Option<StatusCode>>,
    token_expires_in: Mutex<Option<u32>>,
    identity_status: Mutex<Option<StatusCode>>,
    identities: Mutex<Value>,
}

#[derive(Clone, Copy)]
enum CertsFailure {
    Unavailable,
    Garbage,
}

struct MockIdp {
    state: Arc<MockState>,
    provider: IdentityProvider,
}

fn fixture_key(kid: &str) -> Value {
    let jwks: Value = serde_json::from_str(JWKS).unwrap();
    jwks["keys"]
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["kid"] == kid)
        .cloned()
        .unwrap()
}

async fn certs(State(state): State<Arc<MockState>>) -> Response {
    state.jwks_hits.fetch_add(1, Ordering::SeqCst);

    match *state.certs_failure.lock().unwrap() {
        Some(CertsFailure::Unavailable) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Some(CertsFailure::Garbage) => return "<html>maintenance</html>".into_response(),
        None => {}
    }

    let keys = state.published_keys.lock().unwrap().clone();
    Json(json!({ "keys": keys })).into_response()
}

async fn token(State(state): State<Arc<MockState>>, body: String) -> Response {
    state.token_hits.fetch_add(1, Ordering::SeqCst);

    if let Some(status) = *state.token_status.lock().unwrap() {
        let body = json!({
            "error": "unauthorized_client",
            "error_description": "Invalid client secret",
        });
        return (status, Json(body)).into_response();
    }

    assert!(body.contains("grant_type=client_credentials"));
    assert!(body.contains("client_id=backend"));

    let mut response = json!({"access_token": "admin-token", "token_type": "Bearer"});
    if let Some(expires_in) = *state.token_expires_in.lock().unwrap() {
        response["expires_in"] = json!(expires_in);
    }
    Json(response).into_response()
}

async fn federated_identity(
    State(state): State<Arc<MockState>>,
    Path((realm, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.identity_hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(realm, REALM);

    if let Some(status) = *state.identity_status.lock().unwrap() {
        return status.into_response();
    }

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer admin-token");
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if user_id == "unknown-user" {
        return StatusCode::NOT_FOUND.into_response();
    }

    Json(state.identities.lock().unwrap().clone()).into_response()
}

async fn spawn_idp() -> MockIdp {
    let state = Arc::new(MockState::default());
    *state.published_keys.lock().unwrap() = vec![fixture_key("primary")];
    *state.token_expires_in.lock().unwrap() = Some(300);
    *state.identities.lock().unwrap() = json!([]);

    let app = Router::new()
        .route("/realms/{realm}/protocol/openid-connect/certs", get(certs))
        .route("/realms/{realm}/protocol/openid-connect/token", post(token))
        .route(
            "/admin/realms/{realm}/users/{user_id}/federated-identity",
            get(federated_identity),
        )
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let provider = IdentityProvider::keycloak(format!("http://{addr}"), REALM).unwrap();
    MockIdp { state, provider }
}

impl MockIdp {
    fn validator(&self) -> TokenValidator {
        let keys = Arc::new(SigningKeySet::new(self.provider.certs_url.clone()));
        TokenValidator::for_provider(&self.provider, keys)
    }

    fn broker(&self) -> AdminTokenBroker {
        AdminTokenBroker::new(OAuthClient::new(
            "backend",
            SecretString::from("backend-secret".to_string()),
            self.provider.clone(),
        ))
    }

    fn resolver(&self) -> IdentityResolver {
        IdentityResolver::new(self.provider.clone(), "google")
    }

    fn sign(&self, kid: &str, pem: &[u8], exp_offset: i64) -> String {
        self.sign_claims(
            kid,
            pem,
            &json!({
                "sub": "user-1",
                "iss": self.provider.issuer,
                "exp": Utc::now().timestamp() + exp_offset,
            }),
        )
    }

    fn sign_claims(&self, kid: &str, pem: &[u8], claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
    }

    fn hits(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_valid_token_accepted() {
    let idp = spawn_idp().await;
    let validator = idp.validator();

    let token = idp.sign("primary", PRIMARY_PEM, 600);
    let access = validator.validate(&token).await.unwrap();

    assert_eq!(access.subject, "user-1");
    assert_eq!(access.key_id, "primary");
    assert_eq!(access.issuer.as_deref(), Some(idp.provider.issuer.as_str()));

    // Second validation is served from the cache
    validator.validate(&token).await.unwrap();
    assert_eq!(idp.hits(&idp.state.jwks_hits), 1);
}

#[tokio::test]
async fn test_unknown_key_fetches_once() {
    let idp = spawn_idp().await;
    let validator = idp.validator();

    let token = idp.sign("nobody", PRIMARY_PEM, 600);
    let err = validator.validate(&token).await.unwrap_err();

    assert_eq!(err, AuthError::UnknownKey("nobody".into()));
    assert_eq!(idp.hits(&idp.state.jwks_hits), 1);
}

#[tokio::test]
async fn test_rotated_key_picked_up() {
    let idp = spawn_idp().await;
    let validator = idp.validator();

    validator
        .validate(&idp.sign("primary", PRIMARY_PEM, 600))
        .await
        .unwrap();
    assert_eq!(validator.key_set().len().await, 1);

    idp.state
        .published_keys
        .lock()
        .unwrap()
        .push(fixture_key("rotated"));

    let access = validator
        .validate(&idp.sign("rotated", ROTATED_PEM, 600))
        .await
        .unwrap();
    assert_eq!(access.key_id, "rotated");
    assert_eq!(idp.hits(&idp.state.jwks_hits), 2);
    assert_eq!(validator.key_set().len().await, 2);
}

#[tokio::test]
async fn test_expired_token_rejected_without_key_fetch() {
    let idp = spawn_idp().await;
    let err = idp
        .validator()
        .validate(&idp.sign("primary", PRIMARY_PEM, -10))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::Expired);
    assert_eq!(idp.hits(&idp.state.jwks_hits), 0);
}

#[tokio::test]
async fn test_expired_wins_over_signature_and_key() {
    let idp = spawn_idp().await;
    let validator = idp.validator();

    // Signed by a key the provider never published
    let forged = idp.sign("primary", ROTATED_PEM, -10);
    assert_eq!(validator.validate(&forged).await.unwrap_err(), AuthError::Expired);

    let unknown = idp.sign("nobody", PRIMARY_PEM, -10);
    assert_eq!(validator.validate(&unknown).await.unwrap_err(), AuthError::Expired);

    assert_eq!(idp.hits(&idp.state.jwks_hits), 0);
}

#[tokio::test]
async fn test_key_fetch_failure_keeps_cached_keys() {
    let idp = spawn_idp().await;
    let validator = idp.validator();
    let primary = idp.sign("primary", PRIMARY_PEM, 600);
    let rotated = idp.sign("rotated", ROTATED_PEM, 600);

    validator.validate(&primary).await.unwrap();
    assert_eq!(validator.key_set().len().await, 1);

    for failure in [CertsFailure::Unavailable, CertsFailure::Garbage] {
        *idp.state.certs_failure.lock().unwrap() = Some(failure);
        let err = validator.validate(&rotated).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyFetchFailed(_)), "{err:?}");
        assert_eq!(validator.key_set().len().await, 1);
    }
    assert_eq!(idp.hits(&idp.state.jwks_hits), 3);

    // Cached keys keep working while the endpoint is down
    validator.validate(&primary).await.unwrap();
    assert_eq!(idp.hits(&idp.state.jwks_hits), 3);
}

#[tokio::test]
async fn test_wrong_key_signature_rejected() {
    let idp = spawn_idp().await;
    let err = idp
        .validator()
        .validate(&idp.sign("primary", ROTATED_PEM, 600))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::InvalidSignature);
}

#[tokio::test]
async fn test_foreign_issuer_rejected() {
    let idp = spawn_idp().await;
    let token = idp.sign_claims(
        "primary",
        PRIMARY_PEM,
        &json!({
            "sub": "user-1",
            "iss": "https://elsewhere.example.com/realms/test",
            "exp": Utc::now().timestamp() + 600,
        }),
    );

    let err = idp.validator().validate(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidClaim(_)));
}

#[tokio::test]
async fn test_missing_subject_rejected() {
    let idp = spawn_idp().await;
    let token = idp.sign_claims(
        "primary",
        PRIMARY_PEM,
        &json!({"iss": idp.provider.issuer, "exp": Utc::now().timestamp() + 600}),
    );

    let err = idp.validator().validate(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedToken(_)));
}

#[tokio::test]
async fn test_concurrent_misses_share_one_refresh() {
    let idp = spawn_idp().await;
    let validator = Arc::new(idp.validator());
    let token = idp.sign("primary", PRIMARY_PEM, 600);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let validator = Arc::clone(&validator);
            let token = token.clone();
            tokio::spawn(async move { validator.validate(&token).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(idp.hits(&idp.state.jwks_hits), 1);
}

#[tokio::test]
async fn test_admin_token_cached_until_stale() {
    let idp = spawn_idp().await;
    let broker = idp.broker();

    assert_eq!(broker.admin_token().await.unwrap().expose(), "admin-token");
    broker.admin_token().await.unwrap();
    assert_eq!(idp.hits(&idp.state.token_hits), 1);

    broker.invalidate().await;
    broker.admin_token().await.unwrap();
    assert_eq!(idp.hits(&idp.state.token_hits), 2);
}

#[tokio::test]
async fn test_admin_token_without_expiry_not_cached() {
    let idp = spawn_idp().await;
    *idp.state.token_expires_in.lock().unwrap() = None;
    let broker = idp.broker();

    broker.admin_token().await.unwrap();
    broker.admin_token().await.unwrap();
    assert_eq!(idp.hits(&idp.state.token_hits), 2);
}

#[tokio::test]
async fn test_admin_rejection() {
    let idp = spawn_idp().await;
    *idp.state.token_status.lock().unwrap() = Some(StatusCode::UNAUTHORIZED);

    let err = idp.broker().admin_token().await.unwrap_err();
    assert_eq!(
        err,
        FederationError::AdminAuthFailed {
            status: Some(401),
            reason: "unauthorized_client - Invalid client secret".into(),
        }
    );
    assert!(!err.to_string().contains("backend-secret"));
}

#[tokio::test]
async fn test_resolve_linked_identity() {
    let idp = spawn_idp().await;
    *idp.state.identities.lock().unwrap() = json!([
        {"identityProvider": "github", "userId": "gh-7", "userName": "octo", "token": "gh-token"},
        {
            "identityProvider": "google",
            "userId": "g-7",
            "userName": "alice@gmail.com",
            "token": "{\"access_token\":\"ya29.delegated\",\"accessTokenExpiration\":4102444800}"
        }
    ]);

    let admin = idp.broker().admin_token().await.unwrap();
    let identity = idp.resolver().resolve("user-1", &admin).await.unwrap();

    assert_eq!(identity.provider, "google");
    assert_eq!(identity.external_user_id, "g-7");
    assert_eq!(identity.user_name.as_deref(), Some("alice@gmail.com"));
    assert_eq!(identity.token.expose(), "ya29.delegated");
    assert!(identity.expires_at().is_some());
}

#[tokio::test]
async fn test_resolve_without_google_link() {
    let idp = spawn_idp().await;
    *idp.state.identities.lock().unwrap() =
        json!([{"identityProvider": "github", "userId": "gh-7", "token": "gh-token"}]);

    let admin = idp.broker().admin_token().await.unwrap();
    let err = idp.resolver().resolve("user-1", &admin).await.unwrap_err();

    assert_eq!(
        err,
        FederationError::NoLinkedIdentity {
            provider: "google".into()
        }
    );
}

#[tokio::test]
async fn test_resolve_forbidden() {
    let idp = spawn_idp().await;
    *idp.state.identity_status.lock().unwrap() = Some(StatusCode::FORBIDDEN);

    let admin = idp.broker().admin_token().await.unwrap();
    let err = idp.resolver().resolve("user-1", &admin).await.unwrap_err();

    assert!(matches!(
        err,
        FederationError::IdentityLookupFailed {
            status: Some(403),
            ..
        }
    ));
    assert_eq!(idp.hits(&idp.state.identity_hits), 1);
}

#[tokio::test]
async fn test_resolve_unknown_user() {
    let idp = spawn_idp().await;
    let admin = idp.broker().admin_token().await.unwrap();
    let err = idp.resolver().resolve("unknown-user", &admin).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
}
