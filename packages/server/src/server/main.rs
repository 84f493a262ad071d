// Main entry point for the archive server

use std::sync::Arc;

use anyhow::{Context, Result};
use archiver::{Orchestrator, RegistrySnapshot, ScreenerSource, SharedRegistry, StagingStore};
use server_core::kernel::scheduled_tasks::start_scheduler;
use server_core::server::{build_app, AppState};
use server_core::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,archiver=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting financial document archive service");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    // Load the company registry; the service is useless without it
    tracing::info!(url = %config.registry_url, "Downloading company registry...");
    let snapshot = RegistrySnapshot::load(&client, &config.registry_url)
        .await
        .context("Failed to load company registry")?;
    tracing::info!(companies = snapshot.len(), "Registry loaded");
    let registry = SharedRegistry::new(snapshot);

    let staging = Arc::new(StagingStore::new(&config.staging_root, config.retention()));
    let source = Arc::new(
        ScreenerSource::new(&config.source_base_url)
            .context("Invalid SOURCE_BASE_URL")?
            .with_client(client.clone()),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        registry.clone(),
        staging.clone(),
        source,
        config.pipeline_config(),
    ));

    // Hourly sweep and nightly registry refresh
    let _scheduler = start_scheduler(staging, registry, client, config.registry_url.clone())
        .await
        .context("Failed to start scheduled tasks")?;

    // Build application
    let app = build_app(AppState::new(orchestrator, config.worker_count));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
