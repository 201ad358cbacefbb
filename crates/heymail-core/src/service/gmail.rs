//! Gmail REST API client.

use heymail_oauth::DelegatedToken;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::{MailProvider, check_message_id};
use crate::error::MailError;
use crate::model::{MessageRef, ProviderMessage, UNREAD_LABEL};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListMessagesResponse {
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

/// Client for the Gmail v1 API of the authenticated user (`users/me`).
#[derive(Debug, Clone)]
pub struct GmailClient {
    base_url: Url,
    http_client: Client,
}

impl GmailClient {
    /// Production API root.
    pub const DEFAULT_BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Creates a client rooted at `base_url` (e.g. [`Self::DEFAULT_BASE_URL`]).
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http_client: Client::new(),
        }
    }

    /// Sets the HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// `{base}/users/me/messages[/segments...]`, each segment escaped.
    fn messages_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["users", "me", "messages"])
                .extend(segments);
        }
        url
    }

    /// `{base}/users/me/messages/{id}[/action]` for a single message.
    fn message_url(&self, id: &str, action: Option<&str>) -> Result<Url, MailError> {
        check_message_id(id)?;
        Ok(match action {
            Some(action) => self.messages_url(&[id, action]),
            None => self.messages_url(&[id]),
        })
    }

    async fn execute(
        request: RequestBuilder,
        token: &DelegatedToken,
    ) -> Result<Response, MailError> {
        let response = request
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(MailError::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let reason = response
            .json::<GoogleErrorEnvelope>()
            .await
            .ok()
            .map(|e| e.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.to_string());

        Err(MailError::Status {
            status: status.as_u16(),
            reason,
        })
    }
}

impl MailProvider for GmailClient {
    async fn list_messages(
        &self,
        token: &DelegatedToken,
        max_results: u32,
    ) -> Result<Vec<MessageRef>, MailError> {
        let request = self
            .http_client
            .get(self.messages_url(&[]))
            .query(&[("maxResults", max_results)]);

        let listing: ListMessagesResponse = Self::execute(request, token)
            .await?
            .json()
            .await
            .map_err(MailError::from_reqwest)?;

        debug!(count = listing.messages.len(), "Listed messages");
        Ok(listing.messages)
    }

    async fn get_message(
        &self,
        token: &DelegatedToken,
        id: &str,
    ) -> Result<ProviderMessage, MailError> {
        let request = self
            .http_client
            .get(self.message_url(id, None)?)
            .query(&[("format", "full")]);

        Self::execute(request, token)
            .await?
            .json()
            .await
            .map_err(MailError::from_reqwest)
    }

    async fn mark_as_read(&self, token: &DelegatedToken, id: &str) -> Result<(), MailError> {
        let request = self
            .http_client
            .post(self.message_url(id, Some("modify"))?)
            .json(&json!({ "removeLabelIds": [UNREAD_LABEL] }));

        Self::execute(request, token).await?;
        debug!(id = %id, "Marked message as read");
        Ok(())
    }

    async fn send_message(
        &self,
        token: &DelegatedToken,
        raw: &str,
    ) -> Result<MessageRef, MailError> {
        let request = self
            .http_client
            .post(self.messages_url(&["send"]))
            .json(&json!({ "raw": raw }));

        let sent: MessageRef = Self::execute(request, token)
            .await?
            .json()
            .await
            .map_err(MailError::from_reqwest)?;

        debug!(id = %sent.id, "Sent message");
        Ok(sent)
    }

    async fn delete_message(&self, token: &DelegatedToken, id: &str) -> Result<(), MailError> {
        let request = self.http_client.delete(self.message_url(id, None)?);

        Self::execute(request, token).await?;
        debug!(id = %id, "Deleted message");
        Ok(())
    }
}
