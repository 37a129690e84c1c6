use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-version metadata document, persisted next to the archive as
/// `metadata.json`. Write-once: no field changes after creation, only
/// whole-version deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub integrity: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub uploaded_by: String,
    pub dependencies: BTreeMap<String, String>,
}

/// One entry of a package's version index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: String,
    pub integrity: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub dependencies: BTreeMap<String, String>,
}

/// Per-package index document (`index.json`), versions sorted descending by
/// numeric precedence. Deleted outright when the last version is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageIndex {
    pub name: String,
    pub versions: Vec<VersionSummary>,
}

impl PackageIndex {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: Vec::new(),
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<&VersionSummary> {
        self.versions.first()
    }
}

/// Fixed-window rate counter for one client key. The count only increments
/// within its own window; once `reset_at` passes the row is replaced, never
/// merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWindow {
    pub client_key: String,
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}
