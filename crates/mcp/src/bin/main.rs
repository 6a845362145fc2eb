//! Binary entry point for the dlmcp server.

use anyhow::Context;
use clap::Parser;
use dlmcp::{Cli, ServerConfig, app};
use dlmcp_auth::jwt::MultiAudienceVerifier;
use dlmcp_documents::DocumentStore;
use dlmcp_filesystem::Sandbox;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_cli(Cli::parse()).context("invalid configuration")?;
    let sandbox = Sandbox::new(&config.sandbox_root).with_context(|| {
        format!("cannot use sandbox root {}", config.sandbox_root.display())
    })?;
    let verifier = MultiAudienceVerifier::from_config(config.trust.clone())
        .context("invalid token trust settings")?;

    if config.trust.allow_dynamic_audience {
        tracing::warn!("dynamic audiences enabled; do not run this configuration in production");
    }
    tracing::info!(
        issuer = %config.trust.issuer,
        jwks_url = %config.trust.jwks_url,
        audiences = ?config.trust.audiences,
        sandbox_root = %sandbox.root().display(),
        "starting dl-mcp"
    );

    let router = app::router(&config, verifier, sandbox, DocumentStore::demo());
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;
    tracing::info!(addr = %listener.local_addr()?, public_url = %config.public_url, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
