//! Policy configuration for fetching and orchestration.
//!
//! All knobs here are policy defaults, meant to be overridden from the
//! embedding application's configuration rather than hard-coded.

use std::time::Duration;

/// Retry, timeout, and parallelism policy for one fetch pass.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Timeout for each network operation (discovery and per-document
    /// download attempts)
    pub document_timeout: Duration,

    /// Deadline for the whole fetch; pending downloads past it are
    /// abandoned and classified failed
    pub overall_deadline: Duration,

    /// Maximum download attempts per document
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles per attempt
    pub initial_backoff: Duration,

    /// Concurrent downloads in flight
    pub parallelism: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            document_timeout: Duration::from_secs(30),
            overall_deadline: Duration::from_secs(120),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            parallelism: 4,
        }
    }
}

impl FetchConfig {
    /// Set the per-operation timeout.
    pub fn with_document_timeout(mut self, timeout: Duration) -> Self {
        self.document_timeout = timeout;
        self
    }

    /// Set the overall fetch deadline.
    pub fn with_overall_deadline(mut self, deadline: Duration) -> Self {
        self.overall_deadline = deadline;
        self
    }

    /// Set the maximum attempts per document.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the initial retry backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the download parallelism limit.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }
}

/// Configuration for the request orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Fetch policy
    pub fetch: FetchConfig,

    /// Deadline covering lookup, fetch, and archive build. Serving is
    /// not covered; an expired request leaves its staging directory to
    /// the normal sweep schedule.
    pub request_timeout: Duration,

    /// Maximum candidates returned by a search query
    pub search_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            request_timeout: Duration::from_secs(150),
            search_limit: 10,
        }
    }
}

impl PipelineConfig {
    /// Set the fetch policy.
    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Set the request-level timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the search candidate limit.
    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }
}

/// Inclusive publication-year filter for discovery.
///
/// Documents whose year cannot be determined are kept regardless of the
/// range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
    pub from: Option<i32>,
    pub to: Option<i32>,
}

impl YearRange {
    /// A range that accepts every year.
    pub fn any() -> Self {
        Self::default()
    }

    /// A bounded range; either end may be open.
    pub fn new(from: Option<i32>, to: Option<i32>) -> Self {
        Self { from, to }
    }

    /// Whether a document with the given (possibly unknown) year passes
    /// the filter.
    pub fn contains(&self, year: Option<i32>) -> bool {
        let Some(year) = year else { return true };
        if self.from.is_some_and(|from| year < from) {
            return false;
        }
        if self.to.is_some_and(|to| year > to) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_bounds_are_inclusive() {
        let range = YearRange::new(Some(2015), Some(2020));
        assert!(range.contains(Some(2015)));
        assert!(range.contains(Some(2020)));
        assert!(!range.contains(Some(2014)));
        assert!(!range.contains(Some(2021)));
    }

    #[test]
    fn unknown_year_always_passes() {
        let range = YearRange::new(Some(2015), Some(2020));
        assert!(range.contains(None));
        assert!(YearRange::any().contains(Some(1999)));
    }
}
