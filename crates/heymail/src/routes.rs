//! HTTP routes over the federation pipeline.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use heymail_core::{ErrorKind, FederationPipeline, GmailClient, NormalizedEmail, PipelineError};
use heymail_mime::OutgoingMessage;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

/// Shared pipeline handle.
pub type Pipeline = Arc<FederationPipeline<GmailClient>>;

/// Builds the application router.
pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/email", get(list_emails))
        .route("/email/send", post(send_email))
        .route("/email/{id}/read", post(mark_read))
        .route("/email/{id}", delete(delete_email))
        .with_state(pipeline)
}

#[derive(Debug, Serialize)]
struct EmailList {
    messages: Vec<NormalizedEmail>,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    to: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: String,
}

async fn index() -> &'static str {
    "heymail backend is running"
}

async fn list_emails(
    State(pipeline): State<Pipeline>,
    headers: HeaderMap,
) -> Result<Json<EmailList>, ApiError> {
    let messages = pipeline.fetch_emails(authorization(&headers)).await?;
    Ok(Json(EmailList { messages }))
}

async fn send_email(
    State(pipeline): State<Pipeline>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let message = OutgoingMessage::new(request.to, request.subject, request.body);
    let sent = pipeline.send_email(authorization(&headers), &message).await?;
    Ok(Json(SendResponse {
        id: sent.id,
        thread_id: sent.thread_id,
    }))
}

async fn mark_read(
    State(pipeline): State<Pipeline>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    pipeline.mark_as_read(authorization(&headers), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_email(
    State(pipeline): State<Pipeline>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    pipeline.delete_email(authorization(&headers), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// A header that is present but not visible ASCII becomes a placeholder, so
/// it is reported as malformed rather than missing.
fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str().unwrap_or("invalid"))
}

/// Status code for a pipeline failure class.
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::DependencyFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// A failed pipeline run, rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        match kind {
            ErrorKind::Unauthorized | ErrorKind::BadRequest => {
                debug!(kind = ?kind, "Rejected request: {}", self.0);
            }
            _ => warn!(kind = ?kind, "Request failed: {}", self.0),
        }

        let status = status_for(kind);
        let mut response = (status, Json(json!({ "error": self.0.to_string() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, axum::http::HeaderValue::from_static("Bearer"));
        }
        response
    }
}
