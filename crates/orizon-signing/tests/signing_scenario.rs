//! End-to-end signature flow: root issues a child key, the child signs a
//! published package, a trust store rooted in the root verifies it, and
//! the advisory scanner can still fail an otherwise-valid signature.

use orizon_core::{PackageBlob, PackageId, PackageManifest, Version};
use orizon_registry::{MemoryRegistry, MemorySignatureStore, RegistryStore};
use orizon_signing::{
    generate_keypair, issue_child, self_sign_root, sign_package, validate_package_security, verify_package,
    InMemoryScanner, SigningError, TrustStore,
};
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn scenario_7_root_issues_child_signs_and_verifies_then_advisory_fails_it() {
    let registry = MemoryRegistry::new();
    let signatures = MemorySignatureStore::new();
    let cancel = CancellationToken::new();

    let root_key = generate_keypair();
    let root_cert = self_sign_root("orizon-root", &root_key, chrono::Duration::days(365));

    let child_key = generate_keypair();
    let child_cert = issue_child(
        &root_cert,
        &root_key,
        &child_key.verifying_key(),
        "orizon-publisher",
        chrono::Duration::days(90),
        &["package-sign"],
    );

    let manifest = PackageManifest::new(PackageId::new("left-pad").unwrap(), Version::from_str("1.0.0").unwrap());
    let cid = registry
        .publish(PackageBlob { manifest, data: b"left-pad source".to_vec() }, &cancel)
        .await
        .unwrap();

    sign_package(
        &registry,
        &signatures,
        &cid,
        &child_key,
        vec![child_cert, root_cert.clone()],
        &cancel,
    )
    .await
    .unwrap();

    let mut trust_store = TrustStore::new();
    trust_store.add_trusted_root(&root_cert).unwrap();

    verify_package(&registry, &trust_store, &cid, &signatures, &cancel).await.unwrap();

    let scanner = InMemoryScanner::new();
    scanner.flag(cid.clone(), "test");
    let err = validate_package_security(&registry, &trust_store, &cid, &signatures, &scanner, &cancel)
        .await
        .unwrap_err();
    match err {
        SigningError::Advisory(reason) => assert_eq!(reason, "test"),
        other => panic!("expected an advisory failure, got {:?}", other),
    }
}
