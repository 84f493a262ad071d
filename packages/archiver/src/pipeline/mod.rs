//! Request orchestration: lookup → fetch → archive → serve.
//!
//! One [`Orchestrator::run`] call drives a single request's state
//! machine. Failures at each stage map to a [`PipelineError`] variant
//! so the HTTP layer can distinguish user-input outcomes from
//! infrastructure ones. A request-level timeout covers everything up to
//! serving; an expired request leaves its staging directory to the
//! normal sweep schedule rather than deleting it out from under a
//! possible concurrent reader.

use std::fs;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::{build_to_tempfile, ArchiveSummary};
use crate::error::{ArchiveError, PipelineError, PipelineResult, RegistryError};
use crate::fetcher;
use crate::registry::SharedRegistry;
use crate::storage::{ServeGuard, StagingStore};
use crate::traits::source::DocumentSource;
use crate::types::company::CompanyRecord;
use crate::types::config::{PipelineConfig, YearRange};
use crate::types::job::{FailedDocument, FetchJob, JobStatus};

/// States of the per-request machine, in order. Failure is reachable
/// from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Lookup,
    Fetching,
    Archiving,
    Serving,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Lookup => "lookup",
            Self::Fetching => "fetching",
            Self::Archiving => "archiving",
            Self::Serving => "serving",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything the serve path needs: the spooled archive, job metadata
/// for warning headers, and the guard keeping the staging directory
/// out of the sweep until the stream is dropped.
#[derive(Debug)]
pub struct ArchiveResponse {
    pub job: FetchJob,
    pub company: CompanyRecord,
    /// Spooled zip, rewound and ready to stream
    pub archive: fs::File,
    pub summary: ArchiveSummary,
    /// Documents that exhausted retries or hit the fetch deadline
    pub failed: Vec<FailedDocument>,
    pub guard: ServeGuard,
}

impl ArchiveResponse {
    /// Suggested download filename, derived from the identifier.
    pub fn filename(&self) -> String {
        format!("{}_documents.zip", self.company.identifier)
    }

    /// Whether some documents were lost to partial failure.
    pub fn is_partial(&self) -> bool {
        self.job.status == JobStatus::Partial
    }
}

/// Sequences registry lookup, staging, fetch, and archive build for
/// one request at a time. Cheap to share; holds no per-request state.
pub struct Orchestrator {
    registry: SharedRegistry,
    staging: Arc<StagingStore>,
    source: Arc<dyn DocumentSource>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        registry: SharedRegistry,
        staging: Arc<StagingStore>,
        source: Arc<dyn DocumentSource>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            staging,
            source,
            config,
        }
    }

    /// The shared registry handle (for search endpoints and refresh).
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The staging store (for the sweep scheduler and health checks).
    pub fn staging(&self) -> &Arc<StagingStore> {
        &self.staging
    }

    /// Candidate companies for a query, bounded by the search limit.
    pub fn search(&self, query: &str) -> Vec<CompanyRecord> {
        self.registry
            .snapshot()
            .search(query, self.config.search_limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Run one request through LOOKUP → FETCHING → ARCHIVING and hand
    /// back a streamable archive (the SERVING phase belongs to the
    /// caller).
    pub async fn run(&self, query: &str, range: &YearRange) -> PipelineResult<ArchiveResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let job_id = Uuid::new_v4();
        self.transition(job_id, Phase::Received);

        match timeout(
            self.config.request_timeout,
            self.run_to_serving(job_id, query, range),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                self.transition(job_id, Phase::Failed);
                if e.is_user_error() {
                    debug!(job_id = %job_id, outcome = %e, "request rejected");
                } else {
                    error!(job_id = %job_id, error = %e, "job failed");
                }
                Err(e)
            }
            Err(_) => {
                self.transition(job_id, Phase::Failed);
                warn!(
                    job_id = %job_id,
                    "request deadline exceeded; staging directory left for the sweep"
                );
                Err(PipelineError::DeadlineExceeded)
            }
        }
    }

    async fn run_to_serving(
        &self,
        job_id: Uuid,
        query: &str,
        range: &YearRange,
    ) -> PipelineResult<ArchiveResponse> {
        self.transition(job_id, Phase::Lookup);
        let snapshot = self.registry.snapshot();
        // An empty snapshot means the registry never loaded properly;
        // distinguish that from a query that simply matched nothing.
        if snapshot.is_empty() {
            return Err(PipelineError::Registry(RegistryError::Empty));
        }
        let company = snapshot
            .lookup(query)
            .cloned()
            .ok_or_else(|| PipelineError::CompanyNotFound {
                query: query.to_string(),
            })?;
        info!(
            job_id = %job_id,
            identifier = %company.identifier,
            company = %company.name,
            "company resolved"
        );

        let dir = self.staging.allocate(job_id)?;
        // Held until the caller drops the response stream; the sweep
        // skips in-use directories.
        let guard = self.staging.mark_in_use(job_id);

        self.transition(job_id, Phase::Fetching);
        let mut job = FetchJob::new(job_id, &company.identifier);
        let fetch_result = fetcher::fetch(
            self.source.as_ref(),
            &company.identifier,
            &dir.path,
            range,
            &self.config.fetch,
        )
        .await
        .map_err(|e| PipelineError::Discovery {
            identifier: company.identifier.clone(),
            source: e,
        })?;

        job.status = fetch_result.status();
        job.documents = fetch_result.succeeded.clone();
        if job.status == JobStatus::Failed {
            return Err(PipelineError::FetchFailed {
                identifier: company.identifier.clone(),
            });
        }
        if job.status == JobStatus::Partial {
            warn!(
                job_id = %job_id,
                succeeded = fetch_result.succeeded.len(),
                failed = fetch_result.failed.len(),
                "continuing with partial document set"
            );
        }

        self.transition(job_id, Phase::Archiving);
        let dir_path = dir.path.clone();
        let join = tokio::task::spawn_blocking(move || build_to_tempfile(&dir_path)).await;
        let (archive, summary) = match join {
            Ok(result) => result?,
            Err(e) => return Err(ArchiveError::Io(std::io::Error::other(e)).into()),
        };

        if summary.is_empty() {
            warn!(job_id = %job_id, "archive is empty; surfacing warning to caller");
        }

        self.transition(job_id, Phase::Serving);
        Ok(ArchiveResponse {
            job,
            company,
            archive,
            summary,
            failed: fetch_result.failed,
            guard,
        })
    }

    fn transition(&self, job_id: Uuid, phase: Phase) {
        debug!(job_id = %job_id, phase = %phase, "pipeline transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_registry, MockSource};
    use chrono::Utc;
    use std::io::Read;
    use std::time::Duration;

    fn orchestrator(source: MockSource) -> (Orchestrator, tempfile::TempDir, Arc<MockSource>) {
        let root = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(
            root.path(),
            Duration::from_secs(24 * 60 * 60),
        ));
        let source = Arc::new(source);
        let orchestrator = Orchestrator::new(
            SharedRegistry::new(sample_registry()),
            staging,
            source.clone(),
            PipelineConfig::default()
                .with_fetch(crate::FetchConfig::default().with_initial_backoff(Duration::from_millis(1))),
        );
        (orchestrator, root, source)
    }

    fn zip_entry_count(mut file: &fs::File) -> usize {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap().len()
    }

    #[tokio::test]
    async fn partial_fetch_archives_what_succeeded() {
        let source = MockSource::new()
            .with_document("https://docs/a", "2022/Transcript/ACME_Feb_2022_Transcript.pdf")
            .with_document("https://docs/b", "Annual_Reports/2021/Annual_Report_2021.pdf")
            .with_document("https://docs/c", "c.pdf")
            .with_hard_failure("https://docs/d", "d.pdf");
        let (orchestrator, _root, _source) = orchestrator(source);

        let response = orchestrator.run("acme", &YearRange::any()).await.unwrap();

        assert_eq!(response.job.status, JobStatus::Partial);
        assert!(response.is_partial());
        assert_eq!(response.summary.entries, 3);
        assert_eq!(response.failed.len(), 1);
        assert_eq!(response.filename(), "ACME_documents.zip");
        assert_eq!(zip_entry_count(&response.archive), 3);
    }

    #[tokio::test]
    async fn complete_fetch_is_not_partial() {
        let source = MockSource::new().with_document("https://docs/a", "a.pdf");
        let (orchestrator, _root, _source) = orchestrator(source);

        let response = orchestrator.run("ACME", &YearRange::any()).await.unwrap();
        assert_eq!(response.job.status, JobStatus::Complete);
        assert!(!response.is_partial());
        assert_eq!(response.job.documents.len(), 1);
    }

    #[tokio::test]
    async fn staging_dir_survives_sweep_until_response_dropped() {
        let source = MockSource::new().with_document("https://docs/a", "a.pdf");
        let (orchestrator, _root, _source) = orchestrator(source);

        let response = orchestrator.run("acme", &YearRange::any()).await.unwrap();
        let job_id = response.job.id;
        let dir = orchestrator.staging().root().join(job_id.to_string());
        assert!(dir.is_dir());

        // Well past retention, but the serve is still in progress.
        let future = Utc::now() + chrono::Duration::days(2);
        orchestrator.staging().sweep(future).unwrap();
        assert!(dir.is_dir());

        drop(response);
        orchestrator.staging().sweep(future).unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn unknown_company_is_a_user_error() {
        let (orchestrator, _root, source) = orchestrator(MockSource::new());

        let err = orchestrator
            .run("umbrella", &YearRange::any())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::CompanyNotFound { .. }));
        assert!(err.is_user_error());
        assert_eq!(source.discover_calls(), 0);
    }

    #[tokio::test]
    async fn blank_query_is_rejected_before_lookup() {
        let (orchestrator, _root, source) = orchestrator(MockSource::new());

        let err = orchestrator.run("   ", &YearRange::any()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyQuery));
        assert_eq!(source.discover_calls(), 0);
    }

    #[tokio::test]
    async fn empty_registry_is_an_infrastructure_error() {
        use crate::registry::RegistrySnapshot;

        let root = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::new());
        let orchestrator = Orchestrator::new(
            SharedRegistry::new(RegistrySnapshot::from_records(Vec::new())),
            Arc::new(StagingStore::new(root.path(), Duration::from_secs(60))),
            source.clone(),
            PipelineConfig::default(),
        );

        let err = orchestrator.run("acme", &YearRange::any()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registry(RegistryError::Empty)
        ));
        assert!(!err.is_user_error());
        assert_eq!(source.discover_calls(), 0);
    }

    #[tokio::test]
    async fn storage_failure_short_circuits_before_fetch() {
        let root = tempfile::tempdir().unwrap();
        let occupied = root.path().join("occupied");
        fs::write(&occupied, b"x").unwrap();

        let source = Arc::new(MockSource::new().with_document("https://docs/a", "a.pdf"));
        let orchestrator = Orchestrator::new(
            SharedRegistry::new(sample_registry()),
            Arc::new(StagingStore::new(&occupied, Duration::from_secs(60))),
            source.clone(),
            PipelineConfig::default(),
        );

        let err = orchestrator.run("acme", &YearRange::any()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(!err.is_user_error());
        assert_eq!(source.discover_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn all_documents_failing_fails_the_job() {
        let source = MockSource::new()
            .with_failing_document("https://docs/a", "a.pdf")
            .with_failing_document("https://docs/b", "b.pdf");
        let (orchestrator, _root, _source) = orchestrator(source);

        let err = orchestrator.run("acme", &YearRange::any()).await.unwrap_err();
        assert!(matches!(err, PipelineError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn discovery_failure_is_an_infrastructure_error() {
        let source = MockSource::new().with_discovery_failure();
        let (orchestrator, _root, _source) = orchestrator(source);

        let err = orchestrator.run("acme", &YearRange::any()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Discovery { .. }));
        assert!(!err.is_user_error());
    }

    #[tokio::test]
    async fn empty_discovery_yields_empty_archive_warning() {
        let (orchestrator, _root, _source) = orchestrator(MockSource::new());

        let response = orchestrator.run("acme", &YearRange::any()).await.unwrap();
        assert_eq!(response.job.status, JobStatus::Complete);
        assert!(response.summary.is_empty());
        assert_eq!(zip_entry_count(&response.archive), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_fails_the_job_and_leaves_staging_to_the_sweep() {
        let source = MockSource::new()
            .with_slow_document("https://docs/a", "a.pdf", Duration::from_secs(600));
        let root = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(root.path(), Duration::from_secs(60)));
        let orchestrator = Orchestrator::new(
            SharedRegistry::new(sample_registry()),
            staging.clone(),
            Arc::new(source),
            PipelineConfig::default().with_request_timeout(Duration::from_secs(1)),
        );

        let err = orchestrator.run("acme", &YearRange::any()).await.unwrap_err();
        assert!(matches!(err, PipelineError::DeadlineExceeded));

        // The directory was allocated and stays visible to the sweep.
        let dirs: Vec<_> = fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(dirs.len(), 1);
        let future = Utc::now() + chrono::Duration::days(2);
        let report = staging.sweep(future).unwrap();
        assert_eq!(report.deleted, 1);
    }
}
