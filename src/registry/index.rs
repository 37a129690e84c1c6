use std::cmp::Reverse;
use std::sync::Arc;

use super::{ArchiveStore, PackageName, VersionTriple};
use crate::error::Result;
use crate::types::{PackageIndex, VersionSummary};

/// Per-package ordered catalogue of published versions, materialized as the
/// package's `index.json` document.
///
/// The index is a derived, eventually-consistent view: every mutation is a
/// full read-modify-write with no concurrency token, so concurrent writers
/// to one package resolve last-writer-wins. The archive and metadata
/// documents remain the source of truth.
pub struct VersionIndex {
    archive: Arc<ArchiveStore>,
}

impl VersionIndex {
    #[must_use]
    pub fn new(archive: Arc<ArchiveStore>) -> Self {
        Self { archive }
    }

    /// Existence probe used as the pre-write guard for create-once
    /// semantics. Two concurrent uploads can both observe absence before
    /// either writes; that check-then-act window is an accepted limitation.
    pub async fn exists(&self, name: &PackageName, version: &str) -> Result<bool> {
        self.archive.archive_exists(name, version).await
    }

    /// Appends a version summary and rewrites the index sorted. The conflict
    /// gate lives at the caller, on the [`exists`](Self::exists) probe.
    pub async fn create(&self, name: &PackageName, summary: VersionSummary) -> Result<()> {
        let mut index = self
            .archive
            .read_index(name)
            .await?
            .unwrap_or_else(|| PackageIndex::new(name.display()));

        index.versions.push(summary);
        sort_versions(&mut index.versions);

        self.archive.write_index(name, &index).await
    }

    /// Drops a version from the index; removes the index document entirely
    /// when its last version goes. Returns false if the version was not
    /// listed.
    pub async fn remove(&self, name: &PackageName, version: &str) -> Result<bool> {
        let Some(mut index) = self.archive.read_index(name).await? else {
            return Ok(false);
        };

        let before = index.versions.len();
        index.versions.retain(|v| v.version != version);
        if index.versions.len() == before {
            return Ok(false);
        }

        if index.versions.is_empty() {
            self.archive.delete_index(name).await?;
        } else {
            self.archive.write_index(name, &index).await?;
        }
        Ok(true)
    }

    pub async fn get(&self, name: &PackageName) -> Result<Option<PackageIndex>> {
        self.archive.read_index(name).await
    }

    /// First element of the sorted list, absent for an unknown package.
    pub async fn latest(&self, name: &PackageName) -> Result<Option<VersionSummary>> {
        Ok(self
            .archive
            .read_index(name)
            .await?
            .and_then(|index| index.versions.into_iter().next()))
    }
}

/// Descending by numeric `(major, minor, patch)`; the sort is stable and
/// ties (same triple, different suffixes) keep their insertion order.
pub(crate) fn sort_versions(versions: &mut [VersionSummary]) {
    versions.sort_by_key(|v| Reverse(VersionTriple::parse(&v.version).unwrap_or_default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn summary(version: &str) -> VersionSummary {
        VersionSummary {
            version: version.to_string(),
            integrity: format!("sha256-{version}"),
            size: 10,
            uploaded_at: Utc::now(),
            dependencies: BTreeMap::new(),
        }
    }

    fn setup() -> (TempDir, Arc<ArchiveStore>, VersionIndex) {
        let dir = TempDir::new().unwrap();
        let archive = Arc::new(ArchiveStore::new(dir.path()));
        let index = VersionIndex::new(archive.clone());
        (dir, archive, index)
    }

    fn name() -> PackageName {
        PackageName::new("alice", "postgres").unwrap()
    }

    #[tokio::test]
    async fn test_create_sorts_descending() {
        let (_dir, _archive, index) = setup();

        for version in ["1.0.0", "1.10.0", "0.9.1", "1.2.0"] {
            index.create(&name(), summary(version)).await.unwrap();
        }

        let doc = index.get(&name()).await.unwrap().unwrap();
        let versions: Vec<&str> = doc.versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(versions, ["1.10.0", "1.2.0", "1.0.0", "0.9.1"]);
        assert_eq!(doc.name, "@alice/postgres");
    }

    #[tokio::test]
    async fn test_latest_is_head() {
        let (_dir, _archive, index) = setup();
        assert!(index.latest(&name()).await.unwrap().is_none());

        index.create(&name(), summary("1.0.0")).await.unwrap();
        index.create(&name(), summary("1.1.0")).await.unwrap();

        let latest = index.latest(&name()).await.unwrap().unwrap();
        assert_eq!(latest.version, "1.1.0");
    }

    #[tokio::test]
    async fn test_exists_tracks_archive() {
        let (_dir, archive, index) = setup();

        assert!(!index.exists(&name(), "1.0.0").await.unwrap());
        archive.put_archive(&name(), "1.0.0", b"x").await.unwrap();
        assert!(index.exists(&name(), "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_keeps_remaining_versions() {
        let (_dir, _archive, index) = setup();

        index.create(&name(), summary("1.0.0")).await.unwrap();
        index.create(&name(), summary("1.1.0")).await.unwrap();

        assert!(index.remove(&name(), "1.0.0").await.unwrap());
        let doc = index.get(&name()).await.unwrap().unwrap();
        assert_eq!(doc.versions.len(), 1);
        assert_eq!(doc.versions[0].version, "1.1.0");
    }

    #[tokio::test]
    async fn test_remove_last_version_deletes_index() {
        let (_dir, _archive, index) = setup();

        index.create(&name(), summary("1.0.0")).await.unwrap();
        assert!(index.remove(&name(), "1.0.0").await.unwrap());
        assert!(index.get(&name()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_version() {
        let (_dir, _archive, index) = setup();
        assert!(!index.remove(&name(), "1.0.0").await.unwrap());

        index.create(&name(), summary("1.0.0")).await.unwrap();
        assert!(!index.remove(&name(), "9.9.9").await.unwrap());
    }

    #[test]
    fn test_sort_ties_keep_insertion_order() {
        let mut versions = vec![summary("1.0.0-beta"), summary("1.0.0"), summary("0.1.0")];
        sort_versions(&mut versions);
        let order: Vec<&str> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order, ["1.0.0-beta", "1.0.0", "0.1.0"]);
    }
}
