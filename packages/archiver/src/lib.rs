//! Company document acquisition and packaging pipeline.
//!
//! Given a company query, this library resolves it against a CSV-backed
//! registry, downloads the company's published documents from an external
//! source with retry and partial-failure tolerance, stages them in a
//! per-job scratch directory, and packages whatever was retrieved into a
//! single zip stream. Staging directories are reclaimed by an age-based
//! sweep once their retention window expires.
//!
//! # Usage
//!
//! ```rust,ignore
//! use archiver::{Orchestrator, PipelineConfig, SharedRegistry, StagingStore};
//! use archiver::sources::ScreenerSource;
//!
//! let registry = SharedRegistry::new(snapshot);
//! let staging = Arc::new(StagingStore::new("/tmp/financial_archive", retention));
//! let source = Arc::new(ScreenerSource::new("https://www.screener.in")?);
//! let orchestrator = Orchestrator::new(registry, staging, source, PipelineConfig::default());
//!
//! let response = orchestrator.run("acme", &YearRange::any()).await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - The [`DocumentSource`] seam for pluggable sources
//! - [`types`] - Domain data types and policy configuration
//! - [`registry`] - Company registry snapshot and lookup
//! - [`fetcher`] - Retrying, bounded-parallel document downloads
//! - [`storage`] - Staging directory allocation and reclamation sweep
//! - [`archive`] - Deterministic zip building
//! - [`pipeline`] - Per-request orchestration state machine
//! - [`testing`] - Mock source for tests

pub mod archive;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod registry;
pub mod sources;
pub mod storage;
pub mod testing;
pub mod traits;
pub mod types;

pub use error::{ArchiveError, PipelineError, RegistryError, SourceError, StorageError};
pub use traits::source::DocumentSource;
pub use types::{
    company::CompanyRecord,
    config::{FetchConfig, PipelineConfig, YearRange},
    job::{
        DocumentKind, DocumentLink, DocumentRef, FailedDocument, FetchJob, FetchResult, JobStatus,
    },
};

pub use archive::{build_archive, build_to_tempfile, ArchiveSummary};
pub use fetcher::fetch;
pub use pipeline::{ArchiveResponse, Orchestrator, Phase};
pub use registry::{RegistrySnapshot, SharedRegistry};
pub use sources::ScreenerSource;
pub use storage::{ServeGuard, StagingDir, StagingStore, SweepReport};
pub use testing::MockSource;
