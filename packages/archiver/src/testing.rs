//! Testing utilities including a scripted mock document source.
//!
//! Useful for exercising the fetcher and orchestrator without network
//! access: outcomes are scripted per URL and attempts are tracked for
//! assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{SourceError, SourceResult};
use crate::registry::RegistrySnapshot;
use crate::traits::source::DocumentSource;
use crate::types::config::YearRange;
use crate::types::job::{DocumentKind, DocumentLink};

#[derive(Debug, Clone, Default)]
struct Plan {
    /// Transient failures to serve before succeeding; `u32::MAX` means
    /// never succeed
    failures: u32,
    /// Fail immediately with a non-transient status
    hard: bool,
    /// Sleep before responding
    delay: Option<Duration>,
}

/// A document source with scripted per-URL outcomes.
#[derive(Default)]
pub struct MockSource {
    links: Vec<DocumentLink>,
    contents: HashMap<String, Vec<u8>>,
    plans: Mutex<HashMap<String, Plan>>,
    attempts: Mutex<HashMap<String, u32>>,
    discover_calls: AtomicUsize,
    fail_discovery: bool,
    discovery_delay: Option<Duration>,
}

impl MockSource {
    /// A source with no documents and no scripted failures.
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, url: &str, relative_path: &str, plan: Plan) -> Self {
        self.links.push(DocumentLink::new(
            url,
            relative_path,
            DocumentKind::AnnualReport,
        ));
        self.contents
            .insert(url.to_string(), format!("contents of {url}").into_bytes());
        self.plans
            .lock()
            .unwrap()
            .insert(url.to_string(), plan);
        self
    }

    /// Add a document that downloads successfully on the first attempt.
    pub fn with_document(self, url: &str, relative_path: &str) -> Self {
        self.add(url, relative_path, Plan::default())
    }

    /// Add a document with explicit contents.
    pub fn with_document_content(self, url: &str, relative_path: &str, contents: &[u8]) -> Self {
        let mut source = self.add(url, relative_path, Plan::default());
        source.contents.insert(url.to_string(), contents.to_vec());
        source
    }

    /// Add a document that fails transiently `failures` times before
    /// succeeding.
    pub fn with_flaky_document(self, url: &str, relative_path: &str, failures: u32) -> Self {
        self.add(
            url,
            relative_path,
            Plan {
                failures,
                ..Plan::default()
            },
        )
    }

    /// Add a document that never downloads (transient failure every
    /// attempt).
    pub fn with_failing_document(self, url: &str, relative_path: &str) -> Self {
        self.with_flaky_document(url, relative_path, u32::MAX)
    }

    /// Add a document that fails immediately with a non-transient 404.
    pub fn with_hard_failure(self, url: &str, relative_path: &str) -> Self {
        self.add(
            url,
            relative_path,
            Plan {
                hard: true,
                ..Plan::default()
            },
        )
    }

    /// Add a document whose download stalls for `delay` before
    /// succeeding.
    pub fn with_slow_document(self, url: &str, relative_path: &str, delay: Duration) -> Self {
        self.add(
            url,
            relative_path,
            Plan {
                delay: Some(delay),
                ..Plan::default()
            },
        )
    }

    /// Make discovery itself fail with a 500.
    pub fn with_discovery_failure(mut self) -> Self {
        self.fail_discovery = true;
        self
    }

    /// Make discovery stall for `delay` before responding.
    pub fn with_discovery_delay(mut self, delay: Duration) -> Self {
        self.discovery_delay = Some(delay);
        self
    }

    /// How many download attempts were made for a URL.
    pub fn download_attempts(&self, url: &str) -> u32 {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// How many times discovery was called.
    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for MockSource {
    async fn discover(
        &self,
        _identifier: &str,
        _range: &YearRange,
    ) -> SourceResult<Vec<DocumentLink>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.discovery_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_discovery {
            return Err(SourceError::Status {
                url: "mock://discovery".to_string(),
                status: 500,
            });
        }
        Ok(self.links.clone())
    }

    async fn download(&self, link: &DocumentLink) -> SourceResult<Bytes> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(link.url.clone())
            .or_insert(0) += 1;

        let plan = {
            let mut plans = self.plans.lock().unwrap();
            let plan = plans.entry(link.url.clone()).or_default();
            let snapshot = plan.clone();
            if plan.failures > 0 && plan.failures != u32::MAX {
                plan.failures -= 1;
            }
            snapshot
        };

        if let Some(delay) = plan.delay {
            tokio::time::sleep(delay).await;
        }
        if plan.hard {
            return Err(SourceError::Status {
                url: link.url.clone(),
                status: 404,
            });
        }
        if plan.failures > 0 {
            return Err(SourceError::Status {
                url: link.url.clone(),
                status: 503,
            });
        }

        let contents = self
            .contents
            .get(&link.url)
            .cloned()
            .unwrap_or_else(|| b"mock".to_vec());
        Ok(Bytes::from(contents))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A small registry snapshot for tests: Acme Corp (ACME), Globex
/// Industries (GLOBEX), Initech Ltd (INIT).
pub fn sample_registry() -> RegistrySnapshot {
    const CSV: &str = "\
Name,Identifier,NSE Code,BSE Code
Acme Corp,ACME,ACME,500123
Globex Industries,GLOBEX,GLOBEX,
Initech Ltd,INIT,,500789
";
    RegistrySnapshot::from_csv(CSV.as_bytes()).expect("sample registry must parse")
}
