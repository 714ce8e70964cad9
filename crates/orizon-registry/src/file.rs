//! File-backed registry: `<root>/blobs/<cid>.json` plus a best-effort
//! `<root>/index.json` reverse index.

use crate::{check_cancelled, select_best, sorted_dedup, RegistryError, RegistryStore};
use async_trait::async_trait;
use orizon_core::{Cid, Constraint, PackageBlob, PackageId, PackageManifest};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    name: String,
    version: String,
    cid: String,
}

pub struct FileRegistry {
    root: PathBuf,
    /// In-memory mirror of the on-disk index, guarded by a single lock
    /// shared by readers and writers (spec §5).
    index: RwLock<HashMap<String, Vec<(PackageManifest, Cid)>>>,
}

impl FileRegistry {
    /// Open (or create) a file-backed registry rooted at `root`. Loads
    /// `index.json` if present; otherwise rebuilds the index by scanning
    /// `blobs/`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("blobs"))?;
        let index = Self::load_index(&root)?;
        Ok(Self {
            root,
            index: RwLock::new(index),
        })
    }

    fn blob_path(root: &Path, cid: &Cid) -> PathBuf {
        root.join("blobs").join(format!("{}.json", cid.digest_hex()))
    }

    fn index_path(root: &Path) -> PathBuf {
        root.join("index.json")
    }

    fn load_index(root: &Path) -> Result<HashMap<String, Vec<(PackageManifest, Cid)>>, RegistryError> {
        let index_path = Self::index_path(root);
        if index_path.exists() {
            let bytes = std::fs::read(&index_path)?;
            let entries: Vec<IndexEntry> = serde_json::from_slice(&bytes)
                .map_err(|e| RegistryError::Io(format!("corrupt index.json: {}", e)))?;
            return Self::index_from_entries(root, entries);
        }
        Self::rebuild_index_from_blobs(root)
    }

    fn index_from_entries(
        root: &Path,
        entries: Vec<IndexEntry>,
    ) -> Result<HashMap<String, Vec<(PackageManifest, Cid)>>, RegistryError> {
        let mut index: HashMap<String, Vec<(PackageManifest, Cid)>> = HashMap::new();
        for entry in entries {
            let cid = Cid::from_str(&entry.cid).map_err(|e| RegistryError::Io(e.to_string()))?;
            let blob_path = Self::blob_path(root, &cid);
            if !blob_path.exists() {
                continue;
            }
            let bytes = std::fs::read(&blob_path)?;
            let blob: PackageBlob = serde_json::from_slice(&bytes)
                .map_err(|e| RegistryError::Io(format!("corrupt blob {}: {}", cid, e)))?;
            index
                .entry(entry.name)
                .or_default()
                .push((blob.manifest, cid));
        }
        Ok(index)
    }

    fn rebuild_index_from_blobs(root: &Path) -> Result<HashMap<String, Vec<(PackageManifest, Cid)>>, RegistryError> {
        let mut index: HashMap<String, Vec<(PackageManifest, Cid)>> = HashMap::new();
        let blobs_dir = root.join("blobs");
        if !blobs_dir.exists() {
            return Ok(index);
        }
        for entry in std::fs::read_dir(&blobs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let blob: PackageBlob = match serde_json::from_slice(&bytes) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let cid = orizon_core::compute_cid(&blob.data);
            index
                .entry(blob.manifest.name.as_str().to_string())
                .or_default()
                .push((blob.manifest, cid));
        }
        Ok(index)
    }

    /// Best-effort write of `index.json`, sorted by (name, version) per
    /// spec's file back-end layout.
    fn persist_index(&self) {
        let index = self.index.read();
        let mut entries: Vec<IndexEntry> = index
            .iter()
            .flat_map(|(name, versions)| {
                versions.iter().map(move |(manifest, cid)| IndexEntry {
                    name: name.clone(),
                    version: manifest.version.to_string(),
                    cid: cid.to_string(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        drop(index);

        if let Ok(bytes) = serde_json::to_vec_pretty(&entries) {
            if let Err(e) = std::fs::write(Self::index_path(&self.root), bytes) {
                tracing::warn!(error = %e, "failed to persist index.json");
            }
        }
    }

    fn write_blob_atomic(&self, cid: &Cid, blob: &PackageBlob) -> Result<(), RegistryError> {
        let final_path = Self::blob_path(&self.root, cid);
        if final_path.exists() {
            return Ok(());
        }
        let staging_path = self.root.join("blobs").join(format!("{}.json.staging", cid.digest_hex()));
        let bytes = serde_json::to_vec(blob).map_err(|e| RegistryError::Io(e.to_string()))?;
        std::fs::write(&staging_path, bytes)?;
        std::fs::rename(&staging_path, &final_path)?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for FileRegistry {
    async fn publish(&self, blob: PackageBlob, cancel: &CancellationToken) -> Result<Cid, RegistryError> {
        check_cancelled(cancel)?;
        let cid = orizon_core::compute_cid(&blob.data);
        let already_present = {
            let index = self.index.read();
            index
                .get(blob.manifest.name.as_str())
                .map(|entries| entries.iter().any(|(m, _)| m.version == blob.manifest.version))
                .unwrap_or(false)
        };
        if !already_present {
            self.write_blob_atomic(&cid, &blob)?;
            self.index
                .write()
                .entry(blob.manifest.name.as_str().to_string())
                .or_default()
                .push((blob.manifest.clone(), cid.clone()));
            self.persist_index();
        }
        Ok(cid)
    }

    async fn fetch(&self, cid: &Cid, cancel: &CancellationToken) -> Result<PackageBlob, RegistryError> {
        check_cancelled(cancel)?;
        let path = Self::blob_path(&self.root, cid);
        let bytes = std::fs::read(&path).map_err(|_| RegistryError::NotFound(cid.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| RegistryError::Io(format!("corrupt blob {}: {}", cid, e)))
    }

    async fn find(
        &self,
        name: &PackageId,
        constraint: Option<&Constraint>,
        cancel: &CancellationToken,
    ) -> Result<(Cid, PackageManifest), RegistryError> {
        check_cancelled(cancel)?;
        let index = self.index.read();
        let entries = index
            .get(name.as_str())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let manifests: Vec<PackageManifest> = entries.iter().map(|(m, _)| m.clone()).collect();
        let best = select_best(&manifests, constraint).ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let cid = entries
            .iter()
            .find(|(m, _)| m.version == best.version)
            .map(|(_, cid)| cid.clone())
            .expect("version came from entries");
        Ok((cid, best.clone()))
    }

    async fn list(&self, name: &PackageId, cancel: &CancellationToken) -> Result<Vec<PackageManifest>, RegistryError> {
        check_cancelled(cancel)?;
        let index = self.index.read();
        let manifests = index
            .get(name.as_str())
            .map(|entries| entries.iter().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default();
        Ok(sorted_dedup(manifests))
    }

    async fn all(&self, cancel: &CancellationToken) -> Result<Vec<PackageManifest>, RegistryError> {
        check_cancelled(cancel)?;
        let index = self.index.read();
        let manifests = index
            .values()
            .flat_map(|entries| entries.iter().map(|(m, _)| m.clone()))
            .collect();
        Ok(sorted_dedup(manifests))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orizon_core::{PackageId, PackageManifest, Version};
    use std::str::FromStr;

    fn blob(name: &str, version: &str, data: &[u8]) -> PackageBlob {
        PackageBlob {
            manifest: PackageManifest::new(
                PackageId::new(name).unwrap(),
                Version::from_str(version).unwrap(),
            ),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn publish_then_fetch_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let reg = FileRegistry::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();
        let cid = reg.publish(blob("a", "1.0.0", b"hello"), &cancel).await.unwrap();
        let fetched = reg.fetch(&cid, &cancel).await.unwrap();
        assert_eq!(fetched.data, b"hello");
    }

    #[tokio::test]
    async fn reopening_reads_persisted_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = FileRegistry::open(dir.path()).unwrap();
            let cancel = CancellationToken::new();
            reg.publish(blob("a", "1.0.0", b"hello"), &cancel).await.unwrap();
        }
        let reopened = FileRegistry::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();
        let listed = reopened.list(&PackageId::new("a").unwrap(), &cancel).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_blob_scan_without_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let reg = FileRegistry::open(dir.path()).unwrap();
            let cancel = CancellationToken::new();
            reg.publish(blob("a", "1.0.0", b"hello"), &cancel).await.unwrap();
        }
        std::fs::remove_file(dir.path().join("index.json")).unwrap();
        let reopened = FileRegistry::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();
        let listed = reopened.list(&PackageId::new("a").unwrap(), &cancel).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn publish_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let reg = FileRegistry::open(dir.path()).unwrap();
        let cancel = CancellationToken::new();
        reg.publish(blob("a", "1.0.0", b"hello"), &cancel).await.unwrap();
        reg.publish(blob("a", "1.0.0", b"hello"), &cancel).await.unwrap();
        let listed = reg.list(&PackageId::new("a").unwrap(), &cancel).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
