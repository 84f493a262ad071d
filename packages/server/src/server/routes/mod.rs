// HTTP routes
pub mod archive;
pub mod health;
pub mod search;

pub use archive::*;
pub use health::*;
pub use search::*;

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;
    use std::time::Duration;

    use archiver::testing::{sample_registry, MockSource};
    use archiver::{FetchConfig, Orchestrator, PipelineConfig, SharedRegistry, StagingStore};
    use axum::Router;
    use tempfile::TempDir;

    use crate::server::app::{build_app, AppState};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// A router over a mock source and a throwaway staging root. The
    /// TempDir must outlive the requests.
    pub fn app_with_source(source: MockSource) -> (Router, TempDir) {
        let root = TempDir::new().unwrap();
        let staging = Arc::new(StagingStore::new(root.path(), DAY));
        let config = PipelineConfig::default()
            .with_fetch(FetchConfig::default().with_initial_backoff(Duration::from_millis(1)));
        let orchestrator = Arc::new(Orchestrator::new(
            SharedRegistry::new(sample_registry()),
            staging,
            Arc::new(source),
            config,
        ));
        (build_app(AppState::new(orchestrator, 2)), root)
    }
}
