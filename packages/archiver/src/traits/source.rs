//! DocumentSource trait for pluggable document providers.
//!
//! The fetcher is source-agnostic: it owns retries, timeouts, bounded
//! parallelism, and staging, while implementations of this trait only
//! know how to enumerate a company's documents and hand back bytes.
//!
//! # Usage
//!
//! ```rust,ignore
//! use archiver::{DocumentSource, YearRange};
//!
//! let links = source.discover("ACME", &YearRange::any()).await?;
//! let bytes = source.download(&links[0]).await?;
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SourceResult;
use crate::types::config::YearRange;
use crate::types::job::DocumentLink;

/// A provider of company documents.
///
/// Implementations:
/// - `ScreenerSource` - scrapes a screener-style company page
/// - `MockSource` - scripted outcomes for tests
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Enumerate the documents available for a company identifier,
    /// filtered to the given year range.
    ///
    /// Returned links carry unique staging-relative paths; an empty
    /// vector is a valid outcome (company page exists but publishes
    /// nothing in range).
    async fn discover(&self, identifier: &str, range: &YearRange)
        -> SourceResult<Vec<DocumentLink>>;

    /// Download one discovered document.
    ///
    /// Implementations should fail rather than return error-page bodies;
    /// the fetcher decides whether the failure is worth retrying via
    /// [`SourceError::is_transient`](crate::error::SourceError::is_transient).
    async fn download(&self, link: &DocumentLink) -> SourceResult<Bytes>;

    /// Source name for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}
