//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! Two periodic tasks run for the lifetime of the process:
//! - Hourly staging sweep, reclaiming expired per-job directories
//! - Nightly registry refresh, swapping in a fresh company snapshot
//!
//! Both tasks are best-effort: a failed pass is logged and the next
//! scheduled run tries again. A failed registry refresh keeps the
//! previous snapshot in place.

use std::sync::Arc;

use anyhow::Result;
use archiver::{SharedRegistry, StagingStore};
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Start all scheduled tasks
pub async fn start_scheduler(
    staging: Arc<StagingStore>,
    registry: SharedRegistry,
    client: reqwest::Client,
    registry_url: String,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Staging sweep - runs every hour
    let sweep_staging = staging.clone();
    let sweep_job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let staging = sweep_staging.clone();
        Box::pin(async move {
            if let Err(e) = run_staging_sweep(staging).await {
                tracing::error!(error = %e, "Staging sweep task failed");
            }
        })
    })?;
    scheduler.add(sweep_job).await?;

    // Registry refresh - runs daily at 02:00 UTC
    let refresh_job = Job::new_async("0 0 2 * * *", move |_uuid, _lock| {
        let registry = registry.clone();
        let client = client.clone();
        let url = registry_url.clone();
        Box::pin(async move {
            match registry.reload(&client, &url).await {
                Ok(count) => tracing::info!(companies = count, "Registry refresh complete"),
                Err(e) => {
                    tracing::error!(error = %e, "Registry refresh failed; keeping previous snapshot")
                }
            }
        })
    })?;
    scheduler.add(refresh_job).await?;

    scheduler.start().await?;
    tracing::info!("Scheduled tasks started (staging sweep every hour, registry refresh daily)");
    Ok(scheduler)
}

/// Run one staging sweep pass off the async runtime.
async fn run_staging_sweep(staging: Arc<StagingStore>) -> Result<()> {
    let report = tokio::task::spawn_blocking(move || staging.sweep(Utc::now())).await??;
    tracing::info!(
        deleted = report.deleted,
        retained = report.retained,
        skipped_in_use = report.skipped_in_use,
        "Staging sweep pass finished"
    );
    Ok(())
}
