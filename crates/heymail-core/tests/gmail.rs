//! Integration tests for the Gmail REST client against a mock API server.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use url::Url;

use heymail_core::{GmailClient, MailError, MailProvider, NormalizedEmail};
use heymail_oauth::DelegatedToken;

const TOKEN: &str = "ya29.delegated";

#[derive(Default)]
struct GmailState {
    requests: Mutex<Vec<String>>,
    modify_bodies: Mutex<Vec<Value>>,
    send_bodies: Mutex<Vec<Value>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"code": 401, "message": "Request had invalid authentication credentials.", "status": "UNAUTHENTICATED"}})),
    )
        .into_response()
}

async fn list(
    State(state): State<Arc<GmailState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthenticated();
    }
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("list maxResults={}", query["maxResults"]));

    Json(json!({
        "messages": [
            {"id": "m1", "threadId": "t1"},
            {"id": "m2", "threadId": "t2"}
        ],
        "resultSizeEstimate": 2
    }))
    .into_response()
}

async fn message(
    State(state): State<Arc<GmailState>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthenticated();
    }
    state
        .requests
        .lock()
        .unwrap()
        .push(format!("get {id} format={}", query.get("format").map_or("", String::as_str)));

    if id != "m1" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": 404, "message": "Requested entity was not found."}})),
        )
            .into_response();
    }

    Json(json!({
        "id": "m1",
        "threadId": "t1",
        "labelIds": ["INBOX"],
        "internalDate": "1700000000000",
        "payload": {
            "partId": "",
            "mimeType": "multipart/alternative",
            "filename": "",
            "headers": [
                {"name": "Subject", "value": "Welcome"},
                {"name": "From", "value": "Team <team@example.com>"}
            ],
            "body": {"size": 0},
            "parts": [
                {"partId": "0", "mimeType": "text/plain", "filename": "", "headers": [], "body": {"size": 5, "data": "SGVsbG8"}},
                {"partId": "1", "mimeType": "text/html", "filename": "", "headers": [], "body": {"size": 12, "data": "PHA-SGVsbG88L3A-"}}
            ]
        }
    }))
    .into_response()
}

async fn delete(
    State(state): State<Arc<GmailState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthenticated();
    }
    state.requests.lock().unwrap().push(format!("delete {id}"));
    StatusCode::NO_CONTENT.into_response()
}

async fn modify(
    State(state): State<Arc<GmailState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthenticated();
    }
    state.requests.lock().unwrap().push(format!("modify {id}"));
    state.modify_bodies.lock().unwrap().push(body);
    Json(json!({"id": id, "threadId": "t1", "labelIds": ["INBOX"]})).into_response()
}

async fn send(
    State(state): State<Arc<GmailState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return unauthenticated();
    }
    state.send_bodies.lock().unwrap().push(body);
    Json(json!({"id": "s1", "threadId": "st1", "labelIds": ["SENT"]})).into_response()
}

async fn spawn_gmail() -> (Arc<GmailState>, GmailClient) {
    let state = Arc::new(GmailState::default());

    // The literal `send` route takes precedence over the `{id}` capture.
    let app = Router::new()
        .route("/gmail/v1/users/me/messages", get(list))
        .route("/gmail/v1/users/me/messages/send", post(send))
        .route("/gmail/v1/users/me/messages/{id}", get(message).delete(delete))
        .route("/gmail/v1/users/me/messages/{id}/modify", post(modify))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = GmailClient::new(Url::parse(&format!("http://{addr}/gmail/v1")).unwrap());
    (state, client)
}

#[tokio::test]
async fn test_list_and_get() {
    let (state, client) = spawn_gmail().await;
    let token = DelegatedToken::new(TOKEN);

    let refs = client.list_messages(&token, 20).await.unwrap();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].id, "m1");
    assert_eq!(refs[1].thread_id, "t2");

    let message = client.get_message(&token, "m1").await.unwrap();
    let email = NormalizedEmail::from_message(&message);
    assert_eq!(email.subject, "Welcome");
    assert_eq!(email.sender, "Team <team@example.com>");
    assert_eq!(email.body, "<p>Hello</p>");
    assert_eq!(email.date.timestamp_millis(), 1_700_000_000_000);
    assert!(email.read);

    assert_eq!(
        *state.requests.lock().unwrap(),
        vec!["list maxResults=20".to_string(), "get m1 format=full".to_string()]
    );
}

#[tokio::test]
async fn test_not_found_carries_provider_message() {
    let (_state, client) = spawn_gmail().await;

    let err = client
        .get_message(&DelegatedToken::new(TOKEN), "missing")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MailError::Status {
            status: 404,
            reason: "Requested entity was not found.".into(),
        }
    );
}

#[tokio::test]
async fn test_rejected_token() {
    let (_state, client) = spawn_gmail().await;

    let err = client
        .list_messages(&DelegatedToken::new("ya29.revoked"), 20)
        .await
        .unwrap_err();
    assert!(matches!(err, MailError::Status { status: 401, .. }));
    assert!(!err.to_string().contains("ya29.revoked"));
}

#[tokio::test]
async fn test_mark_as_read_removes_unread_label() {
    let (state, client) = spawn_gmail().await;

    client
        .mark_as_read(&DelegatedToken::new(TOKEN), "m1")
        .await
        .unwrap();

    assert_eq!(
        state.modify_bodies.lock().unwrap()[0],
        json!({"removeLabelIds": ["UNREAD"]})
    );
}

#[tokio::test]
async fn test_send_and_delete() {
    let (state, client) = spawn_gmail().await;
    let token = DelegatedToken::new(TOKEN);

    let sent = client.send_message(&token, "VG86IGJvYg").await.unwrap();
    assert_eq!(sent.id, "s1");
    assert_eq!(state.send_bodies.lock().unwrap()[0], json!({"raw": "VG86IGJvYg"}));

    client.delete_message(&token, "m2").await.unwrap();
    assert!(state.requests.lock().unwrap().contains(&"delete m2".to_string()));
}
