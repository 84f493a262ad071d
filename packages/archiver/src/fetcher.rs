//! Document fetching with retries, bounded parallelism, and an overall
//! deadline.
//!
//! Per-document failures are absorbed into the [`FetchResult`] rather
//! than propagated: a document that exhausts its retries is recorded as
//! failed and the job carries on with whatever else succeeded. Only a
//! discovery failure (no document list at all) aborts the fetch.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::{SourceError, SourceResult};
use crate::traits::source::DocumentSource;
use crate::types::config::{FetchConfig, YearRange};
use crate::types::job::{DocumentLink, DocumentRef, FailedDocument, FetchResult};

/// Discover a company's documents and download them into `dest_dir`.
///
/// Downloads run up to `config.parallelism` at a time, each retried on
/// transient failure with exponential backoff up to
/// `config.max_attempts`. The whole pass, discovery included, is
/// bounded by `config.overall_deadline`; downloads still pending at the
/// deadline are abandoned and classified failed.
pub async fn fetch<S>(
    source: &S,
    identifier: &str,
    dest_dir: &Path,
    range: &YearRange,
    config: &FetchConfig,
) -> SourceResult<FetchResult>
where
    S: DocumentSource + ?Sized,
{
    info!(source = source.name(), identifier = %identifier, "document discovery starting");

    // The deadline clock starts here so discovery time counts against
    // the fetch budget, not on top of it.
    let start = Instant::now();
    let deadline = start + config.overall_deadline;
    let discovery_cap = deadline.min(start + config.document_timeout);

    let links = timeout_at(discovery_cap, source.discover(identifier, range))
        .await
        .map_err(|_| SourceError::Timeout {
            url: identifier.to_string(),
        })??;

    if links.is_empty() {
        info!(identifier = %identifier, "no documents discovered");
        return Ok(FetchResult::default());
    }
    info!(identifier = %identifier, documents = links.len(), "downloading documents");

    let mut pending: HashSet<String> = links.iter().map(|l| l.url.clone()).collect();

    let mut downloads = stream::iter(links.into_iter().map(|link| async move {
        let outcome = download_with_retry(source, &link, dest_dir, config).await;
        (link, outcome)
    }))
    .buffer_unordered(config.parallelism);

    let mut result = FetchResult::default();
    loop {
        match timeout_at(deadline, downloads.next()).await {
            Ok(Some((link, Ok(doc)))) => {
                pending.remove(&link.url);
                result.succeeded.push(doc);
            }
            Ok(Some((link, Err(e)))) => {
                pending.remove(&link.url);
                warn!(url = %link.url, error = %e, "document failed after retries");
                result.failed.push(FailedDocument::new(link.url, e.to_string()));
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    identifier = %identifier,
                    abandoned = pending.len(),
                    "fetch deadline exceeded; abandoning pending downloads"
                );
                for url in pending.drain() {
                    result
                        .failed
                        .push(FailedDocument::new(url, "fetch deadline exceeded"));
                }
                break;
            }
        }
    }

    info!(
        identifier = %identifier,
        succeeded = result.succeeded.len(),
        failed = result.failed.len(),
        status = %result.status(),
        "fetch complete"
    );
    Ok(result)
}

async fn download_with_retry<S>(
    source: &S,
    link: &DocumentLink,
    dest_dir: &Path,
    config: &FetchConfig,
) -> SourceResult<DocumentRef>
where
    S: DocumentSource + ?Sized,
{
    let mut backoff = config.initial_backoff;
    let mut attempt = 1u32;
    loop {
        match download_once(source, link, dest_dir, config.document_timeout, attempt).await {
            Ok(doc) => {
                debug!(url = %link.url, attempt = attempt, "document staged");
                return Ok(doc);
            }
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                debug!(
                    url = %link.url,
                    attempt = attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "transient failure; backing off"
                );
                sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn download_once<S>(
    source: &S,
    link: &DocumentLink,
    dest_dir: &Path,
    per_timeout: Duration,
    attempt: u32,
) -> SourceResult<DocumentRef>
where
    S: DocumentSource + ?Sized,
{
    let bytes = timeout(per_timeout, source.download(link))
        .await
        .map_err(|_| SourceError::Timeout {
            url: link.url.clone(),
        })??;

    let path = dest_dir.join(&link.relative_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SourceError::Stage {
                url: link.url.clone(),
                source: e,
            })?;
    }
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| SourceError::Stage {
            url: link.url.clone(),
            source: e,
        })?;

    Ok(DocumentRef {
        source_url: link.url.clone(),
        local_path: link.relative_path.clone(),
        size_bytes: bytes.len() as u64,
        fetched_at: Utc::now(),
        attempt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSource;
    use crate::types::job::JobStatus;

    fn quick_config() -> FetchConfig {
        FetchConfig::default()
            .with_initial_backoff(Duration::from_millis(10))
            .with_overall_deadline(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn all_documents_staged_on_success() {
        let source = MockSource::new()
            .with_document("https://docs/a", "reports/a.pdf")
            .with_document("https://docs/b", "reports/b.pdf")
            .with_document("https://docs/c", "c.pdf");
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &quick_config())
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Complete);
        assert_eq!(result.succeeded.len(), 3);
        assert!(dir.path().join("reports/a.pdf").is_file());
        assert!(dir.path().join("c.pdf").is_file());
        assert!(result.succeeded.iter().all(|d| d.attempt == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_backoff() {
        let source = MockSource::new()
            .with_flaky_document("https://docs/a", "a.pdf", 2)
            .with_document("https://docs/b", "b.pdf");
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &quick_config())
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Complete);
        let flaky = result
            .succeeded
            .iter()
            .find(|d| d.source_url == "https://docs/a")
            .unwrap();
        assert_eq!(flaky.attempt, 3);
        assert_eq!(source.download_attempts("https://docs/a"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_partial_failure() {
        let source = MockSource::new()
            .with_document("https://docs/a", "a.pdf")
            .with_failing_document("https://docs/b", "b.pdf");
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &quick_config())
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Partial);
        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(source.download_attempts("https://docs/b"), 3);
        assert!(!dir.path().join("b.pdf").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn every_document_failing_is_a_failed_fetch() {
        let source = MockSource::new()
            .with_failing_document("https://docs/a", "a.pdf")
            .with_failing_document("https://docs/b", "b.pdf");
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &quick_config())
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Failed);
        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed.len(), 2);
    }

    #[tokio::test]
    async fn non_transient_failures_are_not_retried() {
        let source = MockSource::new()
            .with_document("https://docs/a", "a.pdf")
            .with_hard_failure("https://docs/b", "b.pdf");
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &quick_config())
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Partial);
        assert_eq!(source.download_attempts("https://docs/b"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_abandons_pending_downloads() {
        // 2 of 5 documents download instantly, 3 stall past the deadline.
        let source = MockSource::new()
            .with_document("https://docs/a", "a.pdf")
            .with_document("https://docs/b", "b.pdf")
            .with_slow_document("https://docs/c", "c.pdf", Duration::from_secs(10))
            .with_slow_document("https://docs/d", "d.pdf", Duration::from_secs(10))
            .with_slow_document("https://docs/e", "e.pdf", Duration::from_secs(10));
        let config = quick_config()
            .with_document_timeout(Duration::from_secs(30))
            .with_overall_deadline(Duration::from_secs(5))
            .with_parallelism(5);
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &config)
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Partial);
        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.failed.len(), 3);
        assert!(result
            .failed
            .iter()
            .all(|f| f.reason.contains("deadline")));
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_time_counts_against_the_deadline() {
        // Discovery eats 4s of a 5s budget; the 3s download cannot
        // finish in the 1s that remains.
        let source = MockSource::new()
            .with_discovery_delay(Duration::from_secs(4))
            .with_slow_document("https://docs/a", "a.pdf", Duration::from_secs(3));
        let config = quick_config()
            .with_document_timeout(Duration::from_secs(30))
            .with_overall_deadline(Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &config)
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Failed);
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].reason.contains("deadline"));
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_slower_than_the_deadline_times_out() {
        let source = MockSource::new()
            .with_discovery_delay(Duration::from_secs(10))
            .with_document("https://docs/a", "a.pdf");
        let config = quick_config()
            .with_document_timeout(Duration::from_secs(30))
            .with_overall_deadline(Duration::from_secs(5));
        let dir = tempfile::tempdir().unwrap();

        let err = fetch(&source, "ACME", dir.path(), &YearRange::any(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Timeout { .. }));
    }

    #[tokio::test]
    async fn empty_discovery_is_complete_with_no_documents() {
        let source = MockSource::new();
        let dir = tempfile::tempdir().unwrap();

        let result = fetch(&source, "ACME", dir.path(), &YearRange::any(), &quick_config())
            .await
            .unwrap();

        assert_eq!(result.status(), JobStatus::Complete);
        assert_eq!(result.discovered(), 0);
    }

    #[tokio::test]
    async fn discovery_failure_aborts_the_fetch() {
        let source = MockSource::new().with_discovery_failure();
        let dir = tempfile::tempdir().unwrap();

        let err = fetch(&source, "ACME", dir.path(), &YearRange::any(), &quick_config())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Status { .. }));
    }
}
