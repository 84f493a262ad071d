//! Company registry: CSV snapshot loading and lookup.
//!
//! The registry is an immutable snapshot constructed from an externally
//! maintained CSV (columns `name,identifier`, plus any number of alias
//! columns such as exchange codes). Lookups never mutate; a refresh
//! builds a new snapshot and atomically swaps the shared handle.

use std::io::Read;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::types::company::CompanyRecord;

/// An immutable, point-in-time view of the company registry.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    records: Vec<CompanyRecord>,
    loaded_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// Build a snapshot from already-parsed records.
    pub fn from_records(records: Vec<CompanyRecord>) -> Self {
        Self {
            records,
            loaded_at: Utc::now(),
        }
    }

    /// Parse a snapshot from CSV text.
    ///
    /// The header must contain `name` and `identifier` columns
    /// (case-insensitive). Every other column is treated as an alias
    /// column; rows with an empty identifier fall back to their first
    /// non-empty alias, and rows with neither are dropped.
    pub fn from_csv<R: Read>(reader: R) -> RegistryResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let name_idx = find_column(&headers, "name")
            .ok_or(RegistryError::MissingColumn { name: "name" })?;
        let identifier_idx = find_column(&headers, "identifier")
            .ok_or(RegistryError::MissingColumn { name: "identifier" })?;

        let mut records = Vec::new();
        for row in csv_reader.records() {
            let row = row?;
            let name = row.get(name_idx).unwrap_or("").trim();
            if name.is_empty() {
                continue;
            }

            let mut aliases: Vec<String> = row
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != name_idx && *i != identifier_idx)
                .map(|(_, v)| v.trim())
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
                .map(str::to_string)
                .collect();

            let mut identifier = row.get(identifier_idx).unwrap_or("").trim().to_string();
            if identifier.is_empty() {
                if aliases.is_empty() {
                    continue;
                }
                identifier = aliases.remove(0);
            }

            let mut record = CompanyRecord::new(name, identifier);
            record.aliases = aliases.into_iter().collect();
            records.push(record);
        }

        if records.is_empty() {
            return Err(RegistryError::Empty);
        }

        debug!(companies = records.len(), "registry snapshot parsed");
        Ok(Self::from_records(records))
    }

    /// Fetch and parse a snapshot from a CSV URL.
    pub async fn load(client: &reqwest::Client, url: &str) -> RegistryResult<Self> {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Http(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Http(Box::new(e)))?;

        let snapshot = Self::from_csv(body.as_bytes())?;
        info!(url = %url, companies = snapshot.len(), "registry loaded");
        Ok(snapshot)
    }

    /// Resolve a query to a single company.
    ///
    /// Case-insensitive exact match on identifier/alias first, then on
    /// name, then first substring match on name. `None` means no
    /// candidate matched; it is an expected outcome, not an error.
    pub fn lookup(&self, query: &str) -> Option<&CompanyRecord> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        if let Some(record) = self.records.iter().find(|r| r.matches_code(query)) {
            return Some(record);
        }
        if let Some(record) = self
            .records
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(query))
        {
            return Some(record);
        }

        let needle = query.to_lowercase();
        self.records
            .iter()
            .find(|r| r.name.to_lowercase().contains(&needle))
    }

    /// All candidates matching a query, for presenting a pick list.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&CompanyRecord> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|r| r.name.to_lowercase().contains(&needle) || r.matches_code(query))
            .take(limit)
            .collect()
    }

    /// Number of companies in the snapshot.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no companies.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// When this snapshot was constructed.
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Shared handle to the active registry snapshot.
///
/// Readers clone the inner `Arc` under a briefly-held lock and never
/// hold the lock across an await; a refresh installs a new snapshot
/// atomically without disturbing in-flight lookups.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Arc<RegistrySnapshot>>>,
}

impl SharedRegistry {
    /// Wrap an initial snapshot.
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// The currently active snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner.read().expect("registry lock poisoned").clone()
    }

    /// Install a freshly built snapshot.
    pub fn install(&self, snapshot: RegistrySnapshot) {
        *self.inner.write().expect("registry lock poisoned") = Arc::new(snapshot);
    }

    /// Fetch a new snapshot from the source URL and swap it in.
    ///
    /// On failure the previous snapshot stays active, so a flaky source
    /// degrades to stale data rather than an outage.
    pub async fn reload(&self, client: &reqwest::Client, url: &str) -> RegistryResult<usize> {
        let snapshot = RegistrySnapshot::load(client, url).await?;
        let count = snapshot.len();
        self.install(snapshot);
        info!(companies = count, "registry snapshot swapped");
        Ok(count)
    }
}
