mod api;
mod auth;
mod blob_store;
mod config;
mod directory;
mod face;
mod workflow;

use anyhow::{Context, Result};
use api::{create_router, AppState};
use blob_store::{BlobStore, S3BlobStore};
use config::Config;
use directory::OktaDirectory;
use face::AzureFaceClient;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use workflow::ProfileWorkflow;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting profile service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // External service clients are constructed once and shared per request
    let directory = Arc::new(OktaDirectory::new(&config.okta));
    let blobs = Arc::new(S3BlobStore::new(&config.s3).await);
    let faces = Arc::new(AzureFaceClient::new(&config.face));

    // Container existence is settled once at startup
    blobs
        .ensure_container()
        .await
        .context("Failed to ensure profile image bucket")?;

    let workflow = Arc::new(ProfileWorkflow::new(
        directory,
        blobs,
        faces,
        config.face.verification_threshold,
        config.signed_url_expiry(),
    ));

    let router = create_router(AppState { workflow }, &config.api);
    let addr = format!("{}:{}", config.api.host, config.api.port);

    info!(address = %addr, "Starting profile API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("Profile service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
