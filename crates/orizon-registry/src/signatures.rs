//! Append-only signature bundle storage (spec component C8).

use crate::RegistryError;
use fs2::FileExt;
use orizon_core::Cid;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// Put and list operations over per-CID append-only signature bundles.
/// Implementations are generic over the bundle type so `orizon-signing`
/// owns the concrete `SignatureBundle` shape.
pub trait SignatureStore<B>: Send + Sync
where
    B: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn put(&self, cid: &Cid, bundle: B) -> Result<(), RegistryError>;
    fn list(&self, cid: &Cid) -> Result<Vec<B>, RegistryError>;
}

/// File back-end: one JSON array per CID at `<base>/<cid>.json`. Writers
/// take an exclusive advisory lock on the file; readers are unrestricted.
pub struct FileSignatureStore {
    base: PathBuf,
}

impl FileSignatureStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path(&self, cid: &Cid) -> PathBuf {
        self.base.join(format!("{}.json", cid.digest_hex()))
    }
}

impl<B> SignatureStore<B> for FileSignatureStore
where
    B: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn put(&self, cid: &Cid, bundle: B) -> Result<(), RegistryError> {
        std::fs::create_dir_all(&self.base)?;
        let path = self.path(cid);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        file.lock_exclusive()?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let mut bundles: Vec<B> = if contents.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&contents).map_err(|e| RegistryError::Io(e.to_string()))?
        };
        bundles.push(bundle);

        let serialized = serde_json::to_vec_pretty(&bundles).map_err(|e| RegistryError::Io(e.to_string()))?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(&serialized)?;
        fs2::FileExt::unlock(&file)?;
        Ok(())
    }

    fn list(&self, cid: &Cid) -> Result<Vec<B>, RegistryError> {
        let path = self.path(cid);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|e| RegistryError::Io(e.to_string()))
    }
}

/// In-memory signature store, for tests and the in-process registry path.
#[derive(Default)]
pub struct MemorySignatureStore<B> {
    bundles: RwLock<HashMap<Cid, Vec<B>>>,
}

impl<B: Clone> MemorySignatureStore<B> {
    pub fn new() -> Self {
        Self {
            bundles: RwLock::new(HashMap::new()),
        }
    }
}

impl<B> SignatureStore<B> for MemorySignatureStore<B>
where
    B: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn put(&self, cid: &Cid, bundle: B) -> Result<(), RegistryError> {
        self.bundles.write().entry(cid.clone()).or_default().push(bundle);
        Ok(())
    }

    fn list(&self, cid: &Cid) -> Result<Vec<B>, RegistryError> {
        Ok(self.bundles.read().get(cid).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
    struct TestBundle {
        signature: String,
    }

    #[test]
    fn file_store_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSignatureStore::new(dir.path());
        let cid = orizon_core::compute_cid(b"x");

        store
            .put(&cid, TestBundle { signature: "a".into() })
            .unwrap();
        store
            .put(&cid, TestBundle { signature: "b".into() })
            .unwrap();

        let listed: Vec<TestBundle> = store.list(&cid).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].signature, "a");
        assert_eq!(listed[1].signature, "b");
    }

    #[test]
    fn memory_store_appends_in_order() {
        let store: MemorySignatureStore<TestBundle> = MemorySignatureStore::new();
        let cid = orizon_core::compute_cid(b"x");
        store.put(&cid, TestBundle { signature: "a".into() }).unwrap();
        store.put(&cid, TestBundle { signature: "b".into() }).unwrap();
        let listed = store.list(&cid).unwrap();
        assert_eq!(listed.len(), 2);
    }
}
