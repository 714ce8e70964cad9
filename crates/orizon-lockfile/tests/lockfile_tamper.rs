//! End-to-end lockfile verification against a file-backed registry.

use orizon_core::{PackageBlob, PackageId, PackageManifest, Version};
use orizon_lockfile::{generate_lockfile, verify_lockfile, LockfileError};
use orizon_registry::{FileRegistry, RegistryStore};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

async fn publish(registry: &FileRegistry, name: &str, version: &str) {
    let manifest = PackageManifest::new(PackageId::new(name).unwrap(), Version::from_str(version).unwrap());
    let blob = PackageBlob {
        manifest,
        data: format!("payload for {}@{}", name, version).into_bytes(),
    };
    registry.publish(blob, &CancellationToken::new()).await.unwrap();
}

fn blob_path(root: &std::path::Path, cid: &orizon_core::Cid) -> std::path::PathBuf {
    root.join("blobs").join(format!("{}.json", cid.digest_hex()))
}

#[tokio::test]
async fn generate_then_verify_round_trips_against_disk() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FileRegistry::open(dir.path()).unwrap();
    publish(&registry, "left-pad", "1.0.0").await;

    let mut resolution = orizon_lockfile::Resolution::new();
    resolution.insert(PackageId::new("left-pad").unwrap(), Version::from_str("1.0.0").unwrap());

    let cancel = CancellationToken::new();
    let (lockfile, _bytes) = generate_lockfile(&registry, &resolution, &cancel).await.unwrap();
    verify_lockfile(&registry, &lockfile, &cancel).await.unwrap();
}

#[tokio::test]
async fn tampering_with_a_stored_blob_is_detected_as_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FileRegistry::open(dir.path()).unwrap();
    publish(&registry, "left-pad", "1.0.0").await;
    publish(&registry, "right-pad", "2.0.0").await;

    let mut resolution = orizon_lockfile::Resolution::new();
    resolution.insert(PackageId::new("left-pad").unwrap(), Version::from_str("1.0.0").unwrap());
    resolution.insert(PackageId::new("right-pad").unwrap(), Version::from_str("2.0.0").unwrap());

    let cancel = CancellationToken::new();
    let (lockfile, _bytes) = generate_lockfile(&registry, &resolution, &cancel).await.unwrap();

    // Flip one byte of `left-pad`'s stored blob payload on disk, outside of
    // any registry API, the way an out-of-band disk corruption would.
    let tampered_entry = lockfile
        .entries
        .iter()
        .find(|e| e.name.as_str() == "left-pad")
        .unwrap();
    let path = blob_path(dir.path(), &tampered_entry.cid);
    let raw = std::fs::read_to_string(&path).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let data_field = value["data"].as_str().unwrap().to_string();
    let mut chars: Vec<char> = data_field.chars().collect();
    let first = chars[0];
    chars[0] = if first == 'A' { 'B' } else { 'A' };
    value["data"] = serde_json::Value::String(chars.into_iter().collect());
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    // `fetch` reads the blob straight from disk on every call, so the
    // corruption above is visible without reopening the registry.
    let err = verify_lockfile(&registry, &lockfile, &cancel).await.unwrap_err();
    match err {
        LockfileError::Integrity(reason) => assert!(reason.contains("left-pad")),
        other => panic!("expected an integrity error, got {:?}", other),
    }
}
