//! Per-request federation pipeline.
//!
//! Every run goes validate → admin token → identity lookup before the mail
//! provider is touched, and stops at the first failure. The whole run,
//! including the federation steps, is bounded by one deadline and aborted
//! when the server shuts down.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use heymail_mime::OutgoingMessage;
use heymail_oauth::{
    AdminTokenBroker, DelegatedToken, FederatedIdentity, FederationError, IdentityProvider,
    IdentityResolver, OAuthClient, SigningKeySet, TokenValidator, bearer_token,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, PipelineError, Result};
use crate::model::{MessageRef, NormalizedEmail};
use crate::service::{GmailClient, MailProvider, check_message_id};

/// Tunables of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Deadline for a whole run.
    pub request_timeout: Duration,
    /// Messages fetched concurrently; at least one.
    pub fetch_concurrency: usize,
    /// Listing size.
    pub max_results: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            fetch_concurrency: 5,
            max_results: 20,
        }
    }
}

/// Orchestrates delegated mailbox access for authenticated users.
///
/// Process-wide caches (signing keys, admin token) live inside the
/// validator and broker and are shared by every run.
#[derive(Debug)]
pub struct FederationPipeline<M> {
    validator: TokenValidator,
    broker: AdminTokenBroker,
    resolver: IdentityResolver,
    mail: M,
    options: PipelineOptions,
    shutdown: CancellationToken,
}

impl<M: MailProvider> FederationPipeline<M> {
    /// Assembles a pipeline from its stages.
    #[must_use]
    pub fn new(
        validator: TokenValidator,
        broker: AdminTokenBroker,
        resolver: IdentityResolver,
        mail: M,
    ) -> Self {
        Self {
            validator,
            broker,
            resolver,
            mail,
            options: PipelineOptions::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Sets the run options.
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Ties runs to a shutdown token; cancelling it aborts every in-flight run.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Validates the caller and resolves their delegated identity.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Auth`] if the bearer credential is rejected
    /// and [`PipelineError::Federation`] if the admin exchange or identity
    /// lookup fails.
    pub async fn authorize(&self, authorization: Option<&str>) -> Result<FederatedIdentity> {
        let token = self.validator.validate(bearer_token(authorization)?).await?;
        let admin = self.broker.admin_token().await?;

        match self.resolver.resolve(&token.subject, &admin).await {
            Ok(identity) => {
                if identity.token.is_expired() {
                    warn!(user_id = %token.subject, "Stored delegated token has expired");
                }
                debug!(
                    user_id = %token.subject,
                    provider = %identity.provider,
                    "Resolved federated identity"
                );
                Ok(identity)
            }
            Err(err) => {
                if matches!(
                    err,
                    FederationError::IdentityLookupFailed {
                        status: Some(401),
                        ..
                    }
                ) {
                    // Revoked before its reported expiry.
                    self.broker.invalidate().await;
                }
                Err(err.into())
            }
        }
    }

    /// Lists the caller's newest messages as normalized emails, in listing
    /// order.
    ///
    /// # Errors
    ///
    /// Any federation failure, a failed listing, or any failed message fetch
    /// aborts the run. Undecodable bodies do not.
    pub async fn fetch_emails(&self, authorization: Option<&str>) -> Result<Vec<NormalizedEmail>> {
        self.guarded(async {
            let identity = self.authorize(authorization).await?;
            let refs = self
                .mail
                .list_messages(&identity.token, self.options.max_results)
                .await?;
            let emails = self.fetch_all(&identity, refs).await?;
            info!(count = emails.len(), "Fetched emails");
            Ok(emails)
        })
        .await
    }

    /// Composes and sends a plain text message from the caller's mailbox.
    ///
    /// # Errors
    ///
    /// Returns the first federation or mail provider failure, or
    /// [`PipelineError::InvalidRequest`] for an authorized caller who gave no
    /// recipient.
    pub async fn send_email(
        &self,
        authorization: Option<&str>,
        message: &OutgoingMessage,
    ) -> Result<MessageRef> {
        self.guarded(async {
            let identity = self.authorize(authorization).await?;
            if message.to.trim().is_empty() {
                return Err(PipelineError::InvalidRequest("recipient is required".into()));
            }
            let sent = self.mail.send_message(&identity.token, &message.to_raw()).await?;
            info!(id = %sent.id, "Sent email");
            Ok(sent)
        })
        .await
    }

    /// Marks one of the caller's messages as read.
    ///
    /// # Errors
    ///
    /// Returns the first federation or mail provider failure. An id that
    /// cannot name a message is rejected after authorization.
    pub async fn mark_as_read(&self, authorization: Option<&str>, id: &str) -> Result<()> {
        self.guarded(async {
            let identity = self.authorize(authorization).await?;
            check_message_id(id)?;
            self.mail.mark_as_read(&identity.token, id).await?;
            Ok(())
        })
        .await
    }

    /// Deletes one of the caller's messages.
    ///
    /// # Errors
    ///
    /// Returns the first federation or mail provider failure. An id that
    /// cannot name a message is rejected after authorization.
    pub async fn delete_email(&self, authorization: Option<&str>, id: &str) -> Result<()> {
        self.guarded(async {
            let identity = self.authorize(authorization).await?;
            check_message_id(id)?;
            self.mail.delete_message(&identity.token, id).await?;
            Ok(())
        })
        .await
    }

    /// Fetches and normalizes messages with bounded concurrency. Results are
    /// tagged with their listing index and reordered after completion.
    async fn fetch_all(
        &self,
        identity: &FederatedIdentity,
        refs: Vec<MessageRef>,
    ) -> Result<Vec<NormalizedEmail>> {
        let limit = self.options.fetch_concurrency.max(1);

        let fetches: Vec<_> = refs
            .into_iter()
            .enumerate()
            .map(|(index, message_ref)| self.fetch_one(&identity.token, index, message_ref))
            .collect();

        let mut fetched: Vec<(usize, NormalizedEmail)> = stream::iter(fetches)
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        fetched.sort_unstable_by_key(|(index, _)| *index);
        Ok(fetched.into_iter().map(|(_, email)| email).collect())
    }

    async fn fetch_one(
        &self,
        token: &DelegatedToken,
        index: usize,
        message_ref: MessageRef,
    ) -> Result<(usize, NormalizedEmail)> {
        let message = self.mail.get_message(token, &message_ref.id).await?;
        Ok((index, NormalizedEmail::from_message(&message)))
    }

    /// Applies the run deadline and shutdown cancellation. Dropping the
    /// returned future also drops every in-flight downstream call.
    async fn guarded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let deadline = self.options.request_timeout;

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                debug!("Run cancelled by shutdown");
                Err(PipelineError::Cancelled)
            }
            outcome = tokio::time::timeout(deadline, work) => {
                outcome.unwrap_or_else(|_| {
                    warn!(timeout_ms = deadline.as_millis(), "Run exceeded its deadline");
                    Err(PipelineError::Timeout(deadline))
                })
            }
        }
    }
}

impl FederationPipeline<GmailClient> {
    /// Builds the production pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the identity provider endpoints cannot be
    /// derived or the HTTP client cannot be built.
    pub fn from_config(
        config: &Config,
        shutdown: CancellationToken,
    ) -> std::result::Result<Self, ConfigError> {
        let provider = IdentityProvider::keycloak(&config.keycloak_base_url, config.realm.clone())?;
        let http_client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "HEYMAIL_HTTP_TIMEOUT_MS".to_owned(),
                reason: e.to_string(),
            })?;

        let keys =
            SigningKeySet::new(provider.certs_url.clone()).with_http_client(http_client.clone());
        let mut validator = TokenValidator::for_provider(&provider, Arc::new(keys));
        if let Some(audience) = &config.audience {
            validator = validator.with_audience(audience.clone());
        }

        let broker = AdminTokenBroker::new(
            OAuthClient::new(
                config.client_id.clone(),
                config.client_secret.clone(),
                provider.clone(),
            )
            .with_http_client(http_client.clone()),
        );
        let resolver = IdentityResolver::new(provider, config.target_provider.clone())
            .with_http_client(http_client.clone());
        let mail =
            GmailClient::new(config.gmail_base_url.clone()).with_http_client(http_client);

        Ok(Self::new(validator, broker, resolver, mail)
            .with_options(PipelineOptions {
                request_timeout: config.request_timeout,
                fetch_concurrency: config.fetch_concurrency,
                max_results: config.max_results,
            })
            .with_shutdown(shutdown))
    }
}
