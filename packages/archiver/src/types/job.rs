//! Fetch jobs, document references, and fetch outcomes.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal status of a fetch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted but not yet fetched
    Pending,
    /// Some documents retrieved, some failed after exhausting retries
    Partial,
    /// Every discovered document retrieved
    Complete,
    /// Nothing retrievable
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Broad category of a discovered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    AnnualReport,
    Transcript,
    Presentation,
}

impl DocumentKind {
    /// Label used in staged file paths.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AnnualReport => "Annual_Report",
            Self::Transcript => "Transcript",
            Self::Presentation => "PPT",
        }
    }
}

/// A document discovered by a source, before download.
///
/// `relative_path` is where the document will land inside the job's
/// staging directory, and is also the entry name it keeps in the final
/// archive. Sources are responsible for making it unique within one
/// discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLink {
    /// Absolute or source-relative download URL
    pub url: String,

    /// Destination path relative to the staging directory
    pub relative_path: PathBuf,

    /// Document category
    pub kind: DocumentKind,
}

impl DocumentLink {
    pub fn new(url: impl Into<String>, relative_path: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        Self {
            url: url.into(),
            relative_path: relative_path.into(),
            kind,
        }
    }
}

/// A successfully staged document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Where the document was downloaded from
    pub source_url: String,

    /// Path relative to the staging directory
    pub local_path: PathBuf,

    /// Size on disk
    pub size_bytes: u64,

    /// When the download completed
    pub fetched_at: DateTime<Utc>,

    /// Which attempt succeeded (1-based, bounded by the retry policy)
    pub attempt: u32,
}

/// A document that exhausted its retries or was abandoned at the
/// fetch deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedDocument {
    pub source_url: String,
    pub reason: String,
}

impl FailedDocument {
    pub fn new(source_url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            reason: reason.into(),
        }
    }
}

/// Aggregated outcome of one fetch pass.
///
/// Per-document failures are absorbed here rather than propagated; the
/// job-level status is derived from the two lists.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Documents staged on disk
    pub succeeded: Vec<DocumentRef>,

    /// Documents that could not be retrieved
    pub failed: Vec<FailedDocument>,
}

impl FetchResult {
    /// Derive the job status: FAILED when nothing was retrieved but
    /// failures exist, PARTIAL when both lists are non-empty, COMPLETE
    /// otherwise (including the zero-document case, which surfaces
    /// later as an empty-archive warning).
    pub fn status(&self) -> JobStatus {
        if self.succeeded.is_empty() && !self.failed.is_empty() {
            JobStatus::Failed
        } else if self.failed.is_empty() {
            JobStatus::Complete
        } else {
            JobStatus::Partial
        }
    }

    /// Total documents the source discovered.
    pub fn discovered(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// One archive request from acceptance to terminal status.
///
/// Owned exclusively by the orchestrator for its lifetime; its staging
/// directory is the job's only disk footprint and is released by the
/// reclamation sweep.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub id: Uuid,
    pub identifier: String,
    pub requested_at: DateTime<Utc>,
    pub status: JobStatus,
    pub documents: Vec<DocumentRef>,
}

impl FetchJob {
    pub fn new(id: Uuid, identifier: impl Into<String>) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            requested_at: Utc::now(),
            status: JobStatus::Pending,
            documents: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str) -> DocumentRef {
        DocumentRef {
            source_url: url.to_string(),
            local_path: PathBuf::from("a.pdf"),
            size_bytes: 1,
            fetched_at: Utc::now(),
            attempt: 1,
        }
    }

    #[test]
    fn status_complete_when_no_failures() {
        let result = FetchResult {
            succeeded: vec![doc("https://x/a")],
            failed: vec![],
        };
        assert_eq!(result.status(), JobStatus::Complete);
    }

    #[test]
    fn status_partial_when_mixed() {
        let result = FetchResult {
            succeeded: vec![doc("https://x/a")],
            failed: vec![FailedDocument::new("https://x/b", "timeout")],
        };
        assert_eq!(result.status(), JobStatus::Partial);
    }

    #[test]
    fn status_failed_when_nothing_retrieved() {
        let result = FetchResult {
            succeeded: vec![],
            failed: vec![FailedDocument::new("https://x/b", "timeout")],
        };
        assert_eq!(result.status(), JobStatus::Failed);
    }

    #[test]
    fn status_complete_when_nothing_discovered() {
        let result = FetchResult::default();
        assert_eq!(result.status(), JobStatus::Complete);
    }
}
