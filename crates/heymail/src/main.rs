//! `heymail` - backend bridging identity provider sessions to delegated
//! mailbox access.
//!
//! Validates the caller's bearer token, resolves their linked Google
//! identity through the identity provider's admin API and serves their
//! mailbox over a small JSON API.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod routes;

use std::sync::Arc;

use anyhow::Context;
use heymail_core::{Config, FederationPipeline};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heymail=info,heymail_core=info,heymail_oauth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let shutdown = CancellationToken::new();
    let pipeline = FederationPipeline::from_config(&config, shutdown.clone())
        .context("Failed to build federation pipeline")?;

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!(
        addr = %config.bind_addr,
        realm = %config.realm,
        provider = %config.target_provider,
        "Starting heymail"
    );

    axum::serve(listener, routes::router(Arc::new(pipeline)))
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after cancelling every in-flight pipeline run.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C, graceful shutdown disabled: {e}");
        std::future::pending::<()>().await;
    }

    info!("Shutdown requested");
    shutdown.cancel();
}
