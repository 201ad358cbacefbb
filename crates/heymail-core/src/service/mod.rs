//! Downstream mail provider access.
//!
//! The pipeline only talks to the provider through [`MailProvider`], so
//! tests can substitute an in-memory mailbox.

mod gmail;

use std::future::Future;

use heymail_oauth::DelegatedToken;

pub use gmail::GmailClient;

use crate::error::MailError;
use crate::model::{MessageRef, ProviderMessage};

/// Rejects ids that would not address exactly one message once placed in a
/// URL path (`.` and `..` segments are collapsed by URL normalization).
///
/// # Errors
///
/// Returns [`MailError::InvalidMessageId`] for empty, blank, `.` or `..` ids.
pub fn check_message_id(id: &str) -> Result<(), MailError> {
    if id.trim().is_empty() || id == "." || id == ".." {
        return Err(MailError::InvalidMessageId(id.to_string()));
    }
    Ok(())
}

/// Operations on a mailbox, authorized by the user's delegated token.
pub trait MailProvider: Send + Sync {
    /// Lists the newest messages, newest first.
    fn list_messages(
        &self,
        token: &DelegatedToken,
        max_results: u32,
    ) -> impl Future<Output = Result<Vec<MessageRef>, MailError>> + Send;

    /// Fetches one message with its full part tree.
    fn get_message(
        &self,
        token: &DelegatedToken,
        id: &str,
    ) -> impl Future<Output = Result<ProviderMessage, MailError>> + Send;

    /// Clears the unread marker of a message.
    fn mark_as_read(
        &self,
        token: &DelegatedToken,
        id: &str,
    ) -> impl Future<Output = Result<(), MailError>> + Send;

    /// Sends a base64url-encoded RFC 5322 message.
    fn send_message(
        &self,
        token: &DelegatedToken,
        raw: &str,
    ) -> impl Future<Output = Result<MessageRef, MailError>> + Send;

    /// Permanently deletes a message.
    fn delete_message(
        &self,
        token: &DelegatedToken,
        id: &str,
    ) -> impl Future<Output = Result<(), MailError>> + Send;
}
