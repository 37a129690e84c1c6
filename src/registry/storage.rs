use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use super::PackageName;
use crate::error::{Error, Result};
use crate::types::{PackageIndex, PackageMetadata};

const ARCHIVE_FILENAME: &str = "package.tar.gz";
const METADATA_FILENAME: &str = "metadata.json";
const INDEX_FILENAME: &str = "index.json";

/// Durable package store on the local filesystem. Layout:
///
/// ```text
/// packages/@{scope}/{package}/{version}/package.tar.gz
/// packages/@{scope}/{package}/{version}/metadata.json
/// packages/@{scope}/{package}/index.json
/// ```
///
/// Writes go through a temp file plus rename so readers never observe a
/// partially written object.
pub struct ArchiveStore {
    base_path: PathBuf,
}

fn not_found_as(e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::NotFound
    } else {
        Error::Io(e)
    }
}

impl ArchiveStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("packages"),
        }
    }

    fn package_dir(&self, name: &PackageName) -> PathBuf {
        self.base_path
            .join(format!("@{}", name.scope()))
            .join(name.name())
    }

    fn version_dir(&self, name: &PackageName, version: &str) -> PathBuf {
        self.package_dir(name).join(version)
    }

    fn archive_path(&self, name: &PackageName, version: &str) -> PathBuf {
        self.version_dir(name, version).join(ARCHIVE_FILENAME)
    }

    fn metadata_path(&self, name: &PackageName, version: &str) -> PathBuf {
        self.version_dir(name, version).join(METADATA_FILENAME)
    }

    fn index_path(&self, name: &PackageName) -> PathBuf {
        self.package_dir(name).join(INDEX_FILENAME)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    async fn write_atomic(&self, final_path: &Path, data: &[u8]) -> Result<()> {
        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp_path, final_path).await?;

        Ok(())
    }

    // Archive objects

    pub async fn archive_exists(&self, name: &PackageName, version: &str) -> Result<bool> {
        Ok(fs::try_exists(self.archive_path(name, version)).await?)
    }

    pub async fn put_archive(
        &self,
        name: &PackageName,
        version: &str,
        data: &[u8],
    ) -> Result<()> {
        self.write_atomic(&self.archive_path(name, version), data)
            .await
    }

    /// Opens the archive for streaming. The caller may seek before reading.
    pub async fn get_archive(&self, name: &PackageName, version: &str) -> Result<(File, u64)> {
        let file = File::open(self.archive_path(name, version))
            .await
            .map_err(not_found_as)?;
        let size = file.metadata().await?.len();
        Ok((file, size))
    }

    /// Removes a version directory (archive plus metadata). Returns false if
    /// the version was not present.
    pub async fn delete_version(&self, name: &PackageName, version: &str) -> Result<bool> {
        match fs::remove_dir_all(self.version_dir(name, version)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Error::Io(e)),
        }

        // The package directory disappears with its last version; a non-empty
        // directory makes this a no-op.
        let _ = fs::remove_dir(self.package_dir(name)).await;
        Ok(true)
    }

    // Metadata documents

    pub async fn put_metadata(
        &self,
        name: &PackageName,
        version: &str,
        metadata: &PackageMetadata,
    ) -> Result<()> {
        let data = serde_json::to_vec_pretty(metadata)
            .map_err(|e| Error::Internal(format!("unserializable metadata: {e}")))?;
        self.write_atomic(&self.metadata_path(name, version), &data)
            .await
    }

    pub async fn get_metadata(
        &self,
        name: &PackageName,
        version: &str,
    ) -> Result<Option<PackageMetadata>> {
        let raw = match fs::read(self.metadata_path(name, version)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| Error::Internal(format!("corrupt metadata document: {e}")))
    }

    // Index documents

    pub async fn read_index(&self, name: &PackageName) -> Result<Option<PackageIndex>> {
        let raw = match fs::read(self.index_path(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| Error::Internal(format!("corrupt index document: {e}")))
    }

    pub async fn write_index(&self, name: &PackageName, index: &PackageIndex) -> Result<()> {
        let data = serde_json::to_vec_pretty(index)
            .map_err(|e| Error::Internal(format!("unserializable index: {e}")))?;
        self.write_atomic(&self.index_path(name), &data).await
    }

    pub async fn delete_index(&self, name: &PackageName) -> Result<bool> {
        match fs::remove_file(self.index_path(name)).await {
            Ok(()) => {
                let _ = fs::remove_dir(self.package_dir(name)).await;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Walks every package index in the store. Unreadable documents are
    /// skipped with a warning rather than failing the listing.
    pub async fn list_indexes(&self) -> Result<Vec<PackageIndex>> {
        let mut indexes = Vec::new();

        let mut scopes = match fs::read_dir(&self.base_path).await {
            Ok(scopes) => scopes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(indexes),
            Err(e) => return Err(Error::Io(e)),
        };

        while let Some(scope_entry) = scopes.next_entry().await? {
            let scope_name = scope_entry.file_name();
            let Some(scope) = scope_name.to_str().and_then(|s| s.strip_prefix('@')) else {
                continue;
            };

            let mut packages = match fs::read_dir(scope_entry.path()).await {
                Ok(packages) => packages,
                Err(_) => continue,
            };
            while let Some(package_entry) = packages.next_entry().await? {
                let Some(package) = package_entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let Ok(name) = PackageName::new(scope, &package) else {
                    continue;
                };
                match self.read_index(&name).await {
                    Ok(Some(index)) => indexes.push(index),
                    Ok(None) => {}
                    Err(e) => warn!("skipping unreadable index for {name}: {e}"),
                }
            }
        }

        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VersionSummary;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn name() -> PackageName {
        PackageName::new("alice", "postgres").unwrap()
    }

    fn metadata(version: &str) -> PackageMetadata {
        PackageMetadata {
            name: "@alice/postgres".to_string(),
            version: version.to_string(),
            integrity: "sha256-pmWkWSBCL51Bfkhn79xPuKBKHz//H6B+mY6G9/eieuM=".to_string(),
            size: 3,
            uploaded_at: Utc::now(),
            uploaded_by: "alice".to_string(),
            dependencies: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_archive() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        assert!(!store.archive_exists(&name(), "1.0.0").await.unwrap());
        store.put_archive(&name(), "1.0.0", b"123").await.unwrap();
        assert!(store.archive_exists(&name(), "1.0.0").await.unwrap());

        let (mut file, size) = store.get_archive(&name(), "1.0.0").await.unwrap();
        assert_eq!(size, 3);
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"123");
    }

    #[tokio::test]
    async fn test_layout_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        store.put_archive(&name(), "1.0.0", b"123").await.unwrap();
        store
            .put_metadata(&name(), "1.0.0", &metadata("1.0.0"))
            .await
            .unwrap();

        let version_dir = temp_dir.path().join("packages/@alice/postgres/1.0.0");
        assert!(version_dir.join("package.tar.gz").exists());
        assert!(version_dir.join("metadata.json").exists());
    }

    #[tokio::test]
    async fn test_get_archive_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        assert!(matches!(
            store.get_archive(&name(), "1.0.0").await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        assert!(store.get_metadata(&name(), "1.0.0").await.unwrap().is_none());
        store
            .put_metadata(&name(), "1.0.0", &metadata("1.0.0"))
            .await
            .unwrap();

        let loaded = store.get_metadata(&name(), "1.0.0").await.unwrap().unwrap();
        assert_eq!(loaded.version, "1.0.0");
        assert_eq!(loaded.uploaded_by, "alice");
    }

    #[tokio::test]
    async fn test_delete_version() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        store.put_archive(&name(), "1.0.0", b"123").await.unwrap();
        assert!(store.delete_version(&name(), "1.0.0").await.unwrap());
        assert!(!store.delete_version(&name(), "1.0.0").await.unwrap());
        assert!(!store.archive_exists(&name(), "1.0.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_indexes() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());

        assert!(store.list_indexes().await.unwrap().is_empty());

        let other = PackageName::new("bob", "redis").unwrap();
        for pkg in [&name(), &other] {
            let mut index = PackageIndex::new(pkg.display());
            index.versions.push(VersionSummary {
                version: "1.0.0".to_string(),
                integrity: "sha256-x".to_string(),
                size: 3,
                uploaded_at: Utc::now(),
                dependencies: BTreeMap::new(),
            });
            store.write_index(pkg, &index).await.unwrap();
        }

        let indexes = store.list_indexes().await.unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, "@alice/postgres");
        assert_eq!(indexes[1].name, "@bob/redis");
    }
}
