//! # heymail-core
//!
//! Delegated mailbox access for users of an identity provider.
//!
//! This crate provides:
//! - The federation pipeline: bearer validation, admin token, identity lookup,
//!   then the mail provider call, under one deadline
//! - Bounded, order-preserving message fetching
//! - A Gmail REST client behind the [`MailProvider`] trait
//! - Normalization of provider messages into [`NormalizedEmail`]
//! - Environment configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod model;
pub mod pipeline;
pub mod service;

pub use config::Config;
pub use error::{ConfigError, ErrorKind, MailError, PipelineError, Result};
pub use model::{MessageRef, NormalizedEmail, ProviderMessage};
pub use pipeline::{FederationPipeline, PipelineOptions};
pub use service::{GmailClient, MailProvider, check_message_id};
