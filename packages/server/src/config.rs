use std::time::Duration;

use anyhow::{Context, Result};
use archiver::{FetchConfig, PipelineConfig};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// CSV registry of companies, downloaded at startup and refreshed
    /// nightly
    pub registry_url: String,
    /// Base URL of the document source site
    pub source_base_url: String,
    pub port: u16,
    /// Root directory for per-job staging
    pub staging_root: String,
    /// Hours a staging directory survives before the sweep reclaims it
    pub retention_hours: u64,
    /// Concurrent archive jobs allowed at once
    pub worker_count: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_deadline_secs: u64,
    pub fetch_max_attempts: u32,
    pub fetch_backoff_ms: u64,
    pub fetch_parallelism: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            registry_url: env::var("REGISTRY_URL").context("REGISTRY_URL must be set")?,
            source_base_url: env::var("SOURCE_BASE_URL")
                .unwrap_or_else(|_| "https://www.screener.in".to_string()),
            port: parse_var("PORT", 8080)?,
            staging_root: env::var("STAGING_ROOT")
                .unwrap_or_else(|_| "/tmp/financial_archive".to_string()),
            retention_hours: parse_var("RETENTION_HOURS", 24)?,
            worker_count: parse_var("WORKER_COUNT", 2)?,
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS", 30)?,
            fetch_deadline_secs: parse_var("FETCH_DEADLINE_SECS", 120)?,
            fetch_max_attempts: parse_var("FETCH_MAX_ATTEMPTS", 3)?,
            fetch_backoff_ms: parse_var("FETCH_BACKOFF_MS", 500)?,
            fetch_parallelism: parse_var("FETCH_PARALLELISM", 4)?,
        })
    }

    /// Staging retention window.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 60 * 60)
    }

    /// Pipeline policy assembled from the fetch knobs. The request
    /// timeout is the fetch deadline plus headroom for lookup and the
    /// archive build.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let fetch = FetchConfig::default()
            .with_document_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_overall_deadline(Duration::from_secs(self.fetch_deadline_secs))
            .with_max_attempts(self.fetch_max_attempts)
            .with_initial_backoff(Duration::from_millis(self.fetch_backoff_ms))
            .with_parallelism(self.fetch_parallelism);
        PipelineConfig::default()
            .with_request_timeout(Duration::from_secs(self.fetch_deadline_secs + 30))
            .with_fetch(fetch)
    }
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a valid number, got {value:?}")),
        Err(_) => Ok(default),
    }
}
