//! Deterministic lockfile generation, verification and reconstruction
//! (spec component C6).
//!
//! A lockfile pins a [`Resolution`] to concrete, hash-verified content:
//! every entry records the registry's CID for `(name, version)` plus an
//! independent `sha256` of the blob's bytes, so tampering with either the
//! registry's index or its stored bytes is detectable without re-running
//! the resolver.

use orizon_core::{canonical_json_of, sha256_hex, Cid, PackageId, Version};
use orizon_registry::{RegistryError, RegistryStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Mapping from package name to exactly one pinned version, the input to
/// [`generate_lockfile`] and the output of [`resolution_from_lockfile`].
/// Defined locally (rather than imported from `orizon-resolver`) so this
/// crate has no dependency on the resolver — the lockfile engine is a
/// pure consumer of a `Resolution`-shaped value, not of the resolver
/// itself.
pub type Resolution = BTreeMap<PackageId, Version>;

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl From<LockfileError> for orizon_core::OrizonError {
    fn from(e: LockfileError) -> Self {
        match e {
            LockfileError::Registry(r) => r.into(),
            LockfileError::Integrity(s) => orizon_core::OrizonError::Integrity(s),
        }
    }
}

/// One pinned dependency, `(name, version)`, of a locked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub name: PackageId,
    #[serde(with = "version_serde")]
    pub version: Version,
    pub cid: Cid,
    pub sha256_hex: String,
    /// Dependency `(name, constraint)` pairs, sorted by `(name,
    /// constraint)` per spec §3.
    pub deps: Vec<(PackageId, String)>,
}

/// Ordered, strictly name-sorted record of a resolution (spec §3). The
/// sorted-ness is part of the canonical form: [`verify_lockfile`] rejects
/// an out-of-order document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Lockfile {
    pub entries: Vec<LockEntry>,
}

mod version_serde {
    use super::Version;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(v: &Version, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Version, D::Error> {
        let s = String::deserialize(d)?;
        Version::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Generate a lockfile for `resolution`: for every pinned pair, fetch the
/// manifest and blob, record the CID, hex `sha256`, and a sorted
/// dependency list, then sort entries by name. Returns the lockfile plus
/// its canonical JSON encoding (§4.1).
pub async fn generate_lockfile<S: RegistryStore + ?Sized>(
    registry: &S,
    resolution: &Resolution,
    cancel: &CancellationToken,
) -> Result<(Lockfile, Vec<u8>), LockfileError> {
    let mut entries = Vec::with_capacity(resolution.len());

    for (name, version) in resolution {
        let constraint = orizon_core::Constraint::parse(&format!("={}", version))
            .map_err(|e| LockfileError::Integrity(e.to_string()))?;
        let (cid, manifest) = registry.find(name, Some(&constraint), cancel).await?;
        let blob = registry.fetch(&cid, cancel).await?;

        let mut deps = manifest.dependencies.clone();
        deps.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        entries.push(LockEntry {
            name: name.clone(),
            version: version.clone(),
            cid,
            sha256_hex: sha256_hex(&blob.data),
            deps,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let lockfile = Lockfile { entries };
    let canonical = canonical_json_of(&lockfile);
    Ok((lockfile, canonical))
}

/// Verify `lockfile` against `registry`: entries must be strictly sorted
/// by name, and for each entry the fetched blob's manifest and content
/// hash must match the recorded values. Any mismatch is fatal — never
/// auto-healed (spec §7).
pub async fn verify_lockfile<S: RegistryStore + ?Sized>(
    registry: &S,
    lockfile: &Lockfile,
    cancel: &CancellationToken,
) -> Result<(), LockfileError> {
    for window in lockfile.entries.windows(2) {
        if window[0].name >= window[1].name {
            return Err(LockfileError::Integrity(format!(
                "entries not strictly sorted by name: {} >= {}",
                window[0].name, window[1].name
            )));
        }
    }

    for entry in &lockfile.entries {
        let blob = registry.fetch(&entry.cid, cancel).await?;
        if blob.manifest.name != entry.name || blob.manifest.version != entry.version {
            return Err(LockfileError::Integrity(format!(
                "manifest mismatch for {}: fetched {}@{}",
                entry.name, blob.manifest.name, blob.manifest.version
            )));
        }
        let actual = sha256_hex(&blob.data);
        if actual != entry.sha256_hex {
            return Err(LockfileError::Integrity(format!(
                "content hash mismatch for {}@{}: expected {}, got {}",
                entry.name, entry.version, entry.sha256_hex, actual
            )));
        }
    }

    Ok(())
}

/// Trivially collect `name -> version` from a lockfile.
pub fn resolution_from_lockfile(lockfile: &Lockfile) -> Resolution {
    lockfile
        .entries
        .iter()
        .map(|e| (e.name.clone(), e.version.clone()))
        .collect()
}

/// Serialize `lockfile` to the `{ "entries": [...] }` document of spec §6
/// using canonical JSON.
pub fn to_canonical_bytes(lockfile: &Lockfile) -> Vec<u8> {
    canonical_json_of(lockfile)
}

/// Parse a lockfile document from bytes (not necessarily canonical —
/// e.g. a hand-edited file); callers that need the canonical guarantee
/// should round-trip through [`verify_lockfile`].
pub fn from_bytes(bytes: &[u8]) -> Result<Lockfile, LockfileError> {
    serde_json::from_slice(bytes).map_err(|e| LockfileError::Integrity(format!("malformed lockfile: {}", e)))
}

/// A change to a locked package's pinned version between two lockfiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageChange {
    pub name: PackageId,
    pub old_version: Version,
    pub new_version: Version,
}

/// Diff between two lockfiles: added, removed and version-changed
/// packages, each sorted by name. Used by the CLI's `outdated` command.
#[derive(Debug, Clone, Default)]
pub struct LockDiff {
    pub added: Vec<LockEntry>,
    pub removed: Vec<LockEntry>,
    pub changed: Vec<PackageChange>,
}

impl LockDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Diff `old` against `new`. Added/removed are entries present in only
/// one side; changed is the set of names present in both whose pinned
/// version differs.
pub fn diff(old: &Lockfile, new: &Lockfile) -> LockDiff {
    let old_by_name: BTreeMap<PackageId, &LockEntry> = old.entries.iter().map(|e| (e.name.clone(), e)).collect();
    let new_by_name: BTreeMap<PackageId, &LockEntry> = new.entries.iter().map(|e| (e.name.clone(), e)).collect();

    let mut result = LockDiff::default();
    for (name, entry) in &new_by_name {
        if !old_by_name.contains_key(name) {
            result.added.push((*entry).clone());
        }
    }
    for (name, entry) in &old_by_name {
        if !new_by_name.contains_key(name) {
            result.removed.push((*entry).clone());
        }
    }
    for (name, old_entry) in &old_by_name {
        if let Some(new_entry) = new_by_name.get(name) {
            if old_entry.version != new_entry.version {
                result.changed.push(PackageChange {
                    name: name.clone(),
                    old_version: old_entry.version.clone(),
                    new_version: new_entry.version.clone(),
                });
            }
        }
    }

    result.added.sort_by(|a, b| a.name.cmp(&b.name));
    result.removed.sort_by(|a, b| a.name.cmp(&b.name));
    result.changed.sort_by(|a, b| a.name.cmp(&b.name));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use orizon_core::{PackageBlob, PackageManifest};
    use orizon_registry::MemoryRegistry;

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

    async fn seeded_registry() -> MemoryRegistry {
        let registry = MemoryRegistry::new();
        let cancel = CancellationToken::new();
        registry.publish(blob("a", "1.0.0", &[("b", ">=1.0.0")], b"a-data"), &cancel).await.unwrap();
        registry.publish(blob("b", "1.2.0", &[], b"b-data"), &cancel).await.unwrap();
        registry
    }

    fn resolution() -> Resolution {
        let mut r = Resolution::new();
        r.insert(pkg("a"), Version::from_str("1.0.0").unwrap());
        r.insert(pkg("b"), Version::from_str("1.2.0").unwrap());
        r
    }

    #[tokio::test]
    async fn generate_then_verify_round_trips() {
        let registry = seeded_registry().await;
        let cancel = CancellationToken::new();
        let (lockfile, _bytes) = generate_lockfile(&registry, &resolution(), &cancel).await.unwrap();
        assert!(verify_lockfile(&registry, &lockfile, &cancel).await.is_ok());
        assert_eq!(resolution_from_lockfile(&lockfile), resolution());
    }

    #[tokio::test]
    async fn entries_are_sorted_by_name() {
        let registry = seeded_registry().await;
        let cancel = CancellationToken::new();
        let (lockfile, _) = generate_lockfile(&registry, &resolution(), &cancel).await.unwrap();
        let names: Vec<_> = lockfile.entries.iter().map(|e| e.name.to_string()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn verify_detects_tampered_content() {
        let registry = seeded_registry().await;
        let cancel = CancellationToken::new();
        let (mut lockfile, _) = generate_lockfile(&registry, &resolution(), &cancel).await.unwrap();
        lockfile.entries[0].sha256_hex = "0".repeat(64);
        let err = verify_lockfile(&registry, &lockfile, &cancel).await.unwrap_err();
        assert!(matches!(err, LockfileError::Integrity(_)));
    }

    #[tokio::test]
    async fn verify_rejects_unordered_entries() {
        let registry = seeded_registry().await;
        let cancel = CancellationToken::new();
        let (mut lockfile, _) = generate_lockfile(&registry, &resolution(), &cancel).await.unwrap();
        lockfile.entries.reverse();
        let err = verify_lockfile(&registry, &lockfile, &cancel).await.unwrap_err();
        assert!(matches!(err, LockfileError::Integrity(_)));
    }

    #[test]
    fn canonical_bytes_are_idempotent() {
        let lockfile = Lockfile {
            entries: vec![LockEntry {
                name: pkg("a"),
                version: Version::from_str("1.0.0").unwrap(),
                cid: orizon_core::compute_cid(b"x"),
                sha256_hex: sha256_hex(b"x"),
                deps: vec![],
            }],
        };
        let once = to_canonical_bytes(&lockfile);
        let reparsed = from_bytes(&once).unwrap();
        let twice = to_canonical_bytes(&reparsed);
        assert_eq!(once, twice);
    }

    #[test]
    fn diff_reports_added_removed_and_changed() {
        let entry = |name: &str, version: &str| LockEntry {
            name: pkg(name),
            version: Version::from_str(version).unwrap(),
            cid: orizon_core::compute_cid(name.as_bytes()),
            sha256_hex: sha256_hex(name.as_bytes()),
            deps: vec![],
        };
        let old = Lockfile { entries: vec![entry("a", "1.0.0"), entry("b", "1.0.0")] };
        let new = Lockfile { entries: vec![entry("a", "2.0.0"), entry("c", "1.0.0")] };
        let d = diff(&old, &new);
        assert_eq!(d.added.len(), 1);
        assert_eq!(d.added[0].name, pkg("c"));
        assert_eq!(d.removed.len(), 1);
        assert_eq!(d.removed[0].name, pkg("b"));
        assert_eq!(d.changed.len(), 1);
        assert_eq!(d.changed[0].name, pkg("a"));
    }
}
