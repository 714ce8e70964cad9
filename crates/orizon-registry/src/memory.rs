//! In-memory registry back-end with best-effort peer replication.

use crate::{check_cancelled, select_best, sorted_dedup, RegistryError, RegistryStore};
use async_trait::async_trait;
use orizon_core::{Cid, Constraint, PackageBlob, PackageId, PackageManifest};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type ReplicationEvent = (Cid, PackageBlob);

/// In-process registry guarded by a single reader-writer lock over its
/// blob map and name/version index (spec §5: readers never block each
/// other, writers serialize with readers).
pub struct MemoryRegistry {
    blobs: RwLock<HashMap<Cid, PackageBlob>>,
    index: RwLock<HashMap<String, Vec<(PackageManifest, Cid)>>>,
    peers: RwLock<Vec<mpsc::UnboundedSender<ReplicationEvent>>>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            peers: RwLock::new(Vec::new()),
        }
    }

    /// Link `peer` as a replication target. No shared state is created:
    /// publishes on `self` are sent as `(cid, blob)` events over an
    /// unbounded channel; a background task drains the channel and calls
    /// `peer`'s own `publish`, so peers never see each other's internal
    /// maps. The link is one-directional; call `link_peer` on both sides
    /// for a symmetric pair.
    pub fn link_peer(&self, peer: Arc<MemoryRegistry>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ReplicationEvent>();
        self.peers.write().push(tx);
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            while let Some((_cid, blob)) = rx.recv().await {
                if let Err(e) = peer.publish(blob, &cancel).await {
                    tracing::warn!(error = %e, "peer replication failed");
                }
            }
        });
    }

    fn store_local(&self, blob: PackageBlob) -> Cid {
        let cid = orizon_core::compute_cid(&blob.data);
        let mut blobs = self.blobs.write();
        if blobs.contains_key(&cid) {
            return cid;
        }
        blobs.insert(cid.clone(), blob.clone());
        drop(blobs);

        let mut index = self.index.write();
        let entries = index.entry(blob.manifest.name.as_str().to_string()).or_default();
        if !entries
            .iter()
            .any(|(m, _)| m.version == blob.manifest.version)
        {
            entries.push((blob.manifest.clone(), cid.clone()));
        }
        cid
    }

    fn replicate(&self, cid: Cid, blob: PackageBlob) {
        let peers = self.peers.read();
        for tx in peers.iter() {
            let _ = tx.send((cid.clone(), blob.clone()));
        }
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn publish(&self, blob: PackageBlob, cancel: &CancellationToken) -> Result<Cid, RegistryError> {
        check_cancelled(cancel)?;
        let cid = self.store_local(blob.clone());
        self.replicate(cid.clone(), blob);
        Ok(cid)
    }

    async fn fetch(&self, cid: &Cid, cancel: &CancellationToken) -> Result<PackageBlob, RegistryError> {
        check_cancelled(cancel)?;
        self.blobs
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(cid.to_string()))
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
    use std::time::Duration;

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
    async fn publish_is_idempotent() {
        let reg = MemoryRegistry::new();
        let cancel = CancellationToken::new();
        let cid1 = reg.publish(blob("a", "1.0.0", b"x"), &cancel).await.unwrap();
        let cid2 = reg.publish(blob("a", "1.0.0", b"x"), &cancel).await.unwrap();
        assert_eq!(cid1, cid2);
        assert_eq!(reg.blobs.read().len(), 1);
    }

    #[tokio::test]
    async fn find_returns_highest_matching_version() {
        let reg = MemoryRegistry::new();
        let cancel = CancellationToken::new();
        reg.publish(blob("a", "1.0.0", b"1"), &cancel).await.unwrap();
        reg.publish(blob("a", "2.0.0", b"2"), &cancel).await.unwrap();
        let (_, manifest) = reg
            .find(&PackageId::new("a").unwrap(), None, &cancel)
            .await
            .unwrap();
        assert_eq!(manifest.version, Version::from_str("2.0.0").unwrap());
    }

    #[tokio::test]
    async fn fetch_missing_is_not_found() {
        let reg = MemoryRegistry::new();
        let cancel = CancellationToken::new();
        let cid = orizon_core::compute_cid(b"nope");
        assert!(matches!(
            reg.fetch(&cid, &cancel).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn replicates_to_linked_peer() {
        let source = Arc::new(MemoryRegistry::new());
        let peer = Arc::new(MemoryRegistry::new());
        source.link_peer(peer.clone());

        let cancel = CancellationToken::new();
        source.publish(blob("a", "1.0.0", b"x"), &cancel).await.unwrap();

        // replication is asynchronous; poll briefly for eventual consistency.
        for _ in 0..50 {
            if !peer.blobs.read().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(peer.blobs.read().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_operations() {
        let reg = MemoryRegistry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            reg.publish(blob("a", "1.0.0", b"x"), &cancel).await,
            Err(RegistryError::Cancelled)
        ));
    }
}
