//! Company registry records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One row of the company registry: a display name, the canonical
/// identifier used against the document source, and any alternate codes
/// the company is listed under.
///
/// Records are immutable once loaded; a registry refresh constructs a
/// whole new snapshot rather than mutating records in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Display name (e.g. "Acme Corp")
    pub name: String,

    /// Canonical lookup key for the document source (e.g. "ACME")
    pub identifier: String,

    /// Alternate exchange codes or tickers
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl CompanyRecord {
    /// Create a record with no aliases.
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: identifier.into(),
            aliases: BTreeSet::new(),
        }
    }

    /// Add an alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// Case-insensitive match against identifier or any alias.
    pub fn matches_code(&self, query: &str) -> bool {
        self.identifier.eq_ignore_ascii_case(query)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(query))
    }
}
