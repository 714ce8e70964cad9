//! Manager: lazy transitive-closure index construction, resolution, and
//! bounded-parallel fetch (spec component C5).

use crate::resolver::{PackageIndex, Resolution, ResolutionError, Resolver};
use orizon_core::{Cid, Constraint, PackageId, Version};
use orizon_registry::{RegistryError, RegistryStore};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("cancelled")]
    Cancelled,
}

impl From<ManagerError> for orizon_core::OrizonError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::Registry(r) => r.into(),
            ManagerError::Resolution(r) => r.into(),
            ManagerError::Cancelled => orizon_core::OrizonError::Cancelled,
        }
    }
}

/// I/O concurrency cap: `ORIZON_MAX_CONCURRENCY`, default
/// `max(4, min(1024, cpu_count*8))` (spec §4.5/§5).
fn io_concurrency_limit() -> usize {
    if let Ok(raw) = std::env::var("ORIZON_MAX_CONCURRENCY") {
        if let Ok(n) = raw.parse::<usize>() {
            if n > 0 {
                return n;
            }
        }
    }
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    (cpus * 8).clamp(4, 1024)
}

/// Coordinates `List`/`Find`/`Fetch` against a [`RegistryStore`] to drive
/// the resolver without requiring the whole package universe up front.
pub struct Manager<S: RegistryStore + ?Sized> {
    registry: Arc<S>,
    semaphore: Arc<Semaphore>,
}

impl<S: RegistryStore + ?Sized> Manager<S> {
    pub fn new(registry: Arc<S>) -> Self {
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(io_concurrency_limit())),
        }
    }

    /// Build the transitive-closure package index by repeatedly calling
    /// `List` on every name reachable from `roots`, bounded by the I/O
    /// concurrency semaphore.
    async fn build_index(
        &self,
        roots: &[(PackageId, Constraint)],
        cancel: &CancellationToken,
    ) -> Result<PackageIndex, ManagerError> {
        let mut index = PackageIndex::new();
        let mut seen: HashSet<PackageId> = HashSet::new();
        let mut worklist: VecDeque<PackageId> = VecDeque::new();
        for (name, _) in roots {
            if seen.insert(name.clone()) {
                worklist.push_back(name.clone());
            }
        }

        while !worklist.is_empty() {
            if cancel.is_cancelled() {
                return Err(ManagerError::Cancelled);
            }

            let batch: Vec<PackageId> = worklist.drain(..).collect();
            let mut handles = Vec::with_capacity(batch.len());
            for name in batch {
                let registry = self.registry.clone();
                let semaphore = self.semaphore.clone();
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    registry.list(&name, &cancel).await
                }));
            }

            for handle in handles {
                let manifests = match handle.await.expect("list task panicked") {
                    Ok(m) => m,
                    Err(RegistryError::NotFound(_)) => Vec::new(),
                    Err(e) => return Err(e.into()),
                };
                for manifest in manifests {
                    let deps = manifest
                        .parsed_dependencies()
                        .map_err(|e| ManagerError::Resolution(ResolutionError::InvalidConstraint(e.to_string())))?;
                    for (dep_name, _) in &deps {
                        if seen.insert(dep_name.clone()) {
                            worklist.push_back(dep_name.clone());
                        }
                    }
                    index.insert(manifest);
                }
            }
        }

        Ok(index)
    }

    /// Fetch the pinned version of every package in `resolution` in
    /// parallel (bounded), returning `(name -> (version, cid))`. Any
    /// error aborts the whole operation; partial progress is discarded.
    async fn fetch_pins(
        &self,
        resolution: &Resolution,
        cancel: &CancellationToken,
    ) -> Result<std::collections::BTreeMap<PackageId, (Version, Cid)>, ManagerError> {
        let mut handles = Vec::with_capacity(resolution.len());
        for (name, version) in resolution {
            let registry = self.registry.clone();
            let semaphore = self.semaphore.clone();
            let cancel = cancel.clone();
            let name = name.clone();
            let version = version.clone();
            let constraint = Constraint::parse(&format!("={}", version))
                .map_err(|e| ManagerError::Resolution(ResolutionError::InvalidConstraint(e.to_string())))?;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let (cid, _manifest) = registry.find(&name, Some(&constraint), &cancel).await?;
                registry.fetch(&cid, &cancel).await?;
                Ok::<_, RegistryError>((name, version, cid))
            }));
        }

        let mut out = std::collections::BTreeMap::new();
        for handle in handles {
            let (name, version, cid) = handle.await.expect("fetch task panicked")?;
            out.insert(name, (version, cid));
        }
        Ok(out)
    }

    /// Full resolve-and-fetch pipeline: lazily expand the index, run the
    /// resolver against a snapshot of it, then fetch every pinned CID.
    pub async fn resolve_and_fetch(
        &self,
        roots: &[(PackageId, Constraint)],
        prefer_higher: bool,
        cancel: &CancellationToken,
    ) -> Result<std::collections::BTreeMap<PackageId, (Version, Cid)>, ManagerError> {
        let index = self.build_index(roots, cancel).await?;
        if cancel.is_cancelled() {
            return Err(ManagerError::Cancelled);
        }
        let resolution = Resolver::new(&index, prefer_higher).resolve(roots)?;
        self.fetch_pins(&resolution, cancel).await
    }
}

/// Convenience wrapper over [`Manager::resolve_and_fetch`] for call sites
/// that don't need to reuse the semaphore across calls.
pub async fn resolve_and_fetch<S: RegistryStore + ?Sized>(
    registry: Arc<S>,
    roots: &[(PackageId, Constraint)],
    prefer_higher: bool,
    cancel: &CancellationToken,
) -> Result<std::collections::BTreeMap<PackageId, (Version, Cid)>, ManagerError> {
    Manager::new(registry).resolve_and_fetch(roots, prefer_higher, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use orizon_core::{PackageBlob, PackageManifest};
    use orizon_registry::MemoryRegistry;
    use std::str::FromStr;

    fn pkg(name: &str) -> PackageId {
        PackageId::new(name).unwrap()
    }

    fn blob(name: &str, version: &str, deps: &[(&str, &str)], data: &[u8]) -> PackageBlob {
        let mut m = PackageManifest::new(pkg(name), Version::from_str(version).unwrap());
        for (dep_name, dep_constraint) in deps {
            m.dependencies.push((pkg(dep_name), dep_constraint.to_string()));
        }
        PackageBlob { manifest: m, data: data.to_vec() }
    }

    #[tokio::test]
    async fn resolves_and_fetches_transitive_closure() {
        let registry = Arc::new(MemoryRegistry::new());
        let cancel = CancellationToken::new();
        registry.publish(blob("a", "1.0.0", &[("b", ">=1.0.0")], b"a1"), &cancel).await.unwrap();
        registry.publish(blob("b", "1.0.0", &[], b"b1"), &cancel).await.unwrap();
        registry.publish(blob("b", "1.2.0", &[], b"b2"), &cancel).await.unwrap();

        let manager = Manager::new(registry);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let result = manager.resolve_and_fetch(&roots, true, &cancel).await.unwrap();

        assert_eq!(result.get(&pkg("a")).unwrap().0, Version::from_str("1.0.0").unwrap());
        assert_eq!(result.get(&pkg("b")).unwrap().0, Version::from_str("1.2.0").unwrap());
    }

    #[tokio::test]
    async fn missing_dependency_fails_the_whole_operation() {
        let registry = Arc::new(MemoryRegistry::new());
        let cancel = CancellationToken::new();
        registry.publish(blob("a", "1.0.0", &[("missing", ">=1.0.0")], b"a1"), &cancel).await.unwrap();

        let manager = Manager::new(registry);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let err = manager.resolve_and_fetch(&roots, true, &cancel).await.unwrap_err();
        assert!(matches!(err, ManagerError::Resolution(ResolutionError::Conflict { .. })));
    }

    #[test]
    fn concurrency_limit_respects_env_override() {
        std::env::set_var("ORIZON_MAX_CONCURRENCY", "7");
        assert_eq!(io_concurrency_limit(), 7);
        std::env::remove_var("ORIZON_MAX_CONCURRENCY");
    }
}
