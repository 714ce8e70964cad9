//! Package descriptors, signature bundles, and the advisory scanner hook
//! (spec components C7 descriptor half and C8 consumer).

use crate::cert::{fingerprint, Certificate, KeyId, SigningError, TrustStore};
use ed25519_dalek::{Signer, SigningKey, Verifier};
use orizon_core::{canonical_json_of, Cid, PackageId, Version};
use orizon_registry::{RegistryStore, SignatureStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Canonical, sign-able projection of a blob's identity (spec §3): this,
/// not the raw blob, is the artefact a [`SignatureBundle`] attests to —
/// re-signing never requires rehashing payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: PackageId,
    #[serde(with = "version_serde")]
    pub version: Version,
    pub cid: Cid,
    pub sha256_hex: String,
    pub deps: Vec<(PackageId, String)>,
}

mod version_serde {
    use orizon_core::Version;
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

/// `(algorithm, key_id, signature, chain)` as specified in spec §3. The
/// chain is ordered leaf-first; `key_id` is the leaf's fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureBundle {
    pub algorithm: String,
    pub key_id: KeyId,
    pub signature: String,
    pub chain: Vec<Certificate>,
}

/// Build the descriptor for `cid`: fetch its blob, hash the data, and
/// copy the manifest's name/version plus a sorted dependency list.
pub async fn build_descriptor<S: RegistryStore + ?Sized>(
    registry: &S,
    cid: &Cid,
    cancel: &CancellationToken,
) -> Result<PackageDescriptor, SigningError> {
    let blob = registry.fetch(cid, cancel).await?;
    let mut deps = blob.manifest.dependencies.clone();
    deps.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(PackageDescriptor {
        name: blob.manifest.name,
        version: blob.manifest.version,
        cid: cid.clone(),
        sha256_hex: orizon_core::sha256_hex(&blob.data),
        deps,
    })
}

fn descriptor_bytes(desc: &PackageDescriptor) -> Vec<u8> {
    canonical_json_of(desc)
}

/// Sign `desc` with `signer_priv`, recording `chain` (leaf-first,
/// presumably rooted in a trusted root) in the resulting bundle.
pub fn sign_descriptor(desc: &PackageDescriptor, signer_priv: &SigningKey, chain: Vec<Certificate>) -> SignatureBundle {
    let signature = signer_priv.sign(&descriptor_bytes(desc));
    SignatureBundle {
        algorithm: "ed25519".to_string(),
        key_id: fingerprint(&signer_priv.verifying_key()),
        signature: hex::encode(signature.to_bytes()),
        chain,
    }
}

/// Verify `bundle` against `desc`: validate the chain via `trust_store`,
/// recompute canonical descriptor bytes, verify the Ed25519 signature
/// with the leaf public key, and check `key_id` matches the leaf's
/// fingerprint.
pub fn verify_descriptor(desc: &PackageDescriptor, bundle: &SignatureBundle, trust_store: &TrustStore) -> Result<(), SigningError> {
    trust_store.verify_chain(&bundle.chain)?;

    let leaf = bundle
        .chain
        .first()
        .ok_or_else(|| SigningError::InvalidCertificate("empty chain".to_string()))?;
    let leaf_pub = leaf.public_key()?;

    if fingerprint(&leaf_pub) != bundle.key_id {
        return Err(SigningError::KeyMismatch);
    }

    let sig_bytes = hex::decode(&bundle.signature).map_err(|e| SigningError::InvalidCertificate(e.to_string()))?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| SigningError::InvalidCertificate("signature must be 64 bytes".to_string()))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);

    leaf_pub
        .verify(&descriptor_bytes(desc), &signature)
        .map_err(|_| SigningError::DescriptorSignatureInvalid)
}

/// Sign `cid`'s current descriptor and append the resulting bundle to
/// `store` (append-only per CID).
pub async fn sign_package<R, B>(
    registry: &R,
    store: &B,
    cid: &Cid,
    signer_priv: &SigningKey,
    chain: Vec<Certificate>,
    cancel: &CancellationToken,
) -> Result<SignatureBundle, SigningError>
where
    R: RegistryStore + ?Sized,
    B: SignatureStore<SignatureBundle> + ?Sized,
{
    let desc = build_descriptor(registry, cid, cancel).await?;
    let bundle = sign_descriptor(&desc, signer_priv, chain);
    store.put(cid, bundle.clone())?;
    Ok(bundle)
}

/// Succeeds if at least one bundle stored for `cid` verifies; otherwise
/// returns the last error encountered.
pub async fn verify_package<R, B>(
    registry: &R,
    trust_store: &TrustStore,
    cid: &Cid,
    store: &B,
    cancel: &CancellationToken,
) -> Result<(), SigningError>
where
    R: RegistryStore + ?Sized,
    B: SignatureStore<SignatureBundle> + ?Sized,
{
    let desc = build_descriptor(registry, cid, cancel).await?;
    let bundles = store.list(cid)?;
    if bundles.is_empty() {
        return Err(SigningError::NoValidSignature);
    }

    let mut last_err = SigningError::NoValidSignature;
    for bundle in &bundles {
        match verify_descriptor(&desc, bundle, trust_store) {
            Ok(()) => return Ok(()),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Pluggable advisory hook consulted after a package's signature
/// verifies (spec §4.7). The core ships no real advisory feed — only a
/// no-op scanner and an in-memory one for tests.
pub trait VulnerabilityScanner: Send + Sync {
    fn scan(&self, descriptor: &PackageDescriptor) -> (bool, Option<String>);
}

/// Always reports the package as clean.
pub struct NullScanner;

impl VulnerabilityScanner for NullScanner {
    fn scan(&self, _descriptor: &PackageDescriptor) -> (bool, Option<String>) {
        (false, None)
    }
}

/// Test/demo scanner: flags CIDs registered via [`InMemoryScanner::flag`].
#[derive(Default)]
pub struct InMemoryScanner {
    flagged: RwLock<HashMap<Cid, String>>,
}

impl InMemoryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&self, cid: Cid, reason: impl Into<String>) {
        self.flagged.write().expect("lock not poisoned").insert(cid, reason.into());
    }
}

impl VulnerabilityScanner for InMemoryScanner {
    fn scan(&self, descriptor: &PackageDescriptor) -> (bool, Option<String>) {
        match self.flagged.read().expect("lock not poisoned").get(&descriptor.cid) {
            Some(reason) => (true, Some(reason.clone())),
            None => (false, None),
        }
    }
}

/// Run [`verify_package`] then consult `scanner`; a positive advisory is
/// fatal even if the signature verified.
pub async fn validate_package_security<R, B>(
    registry: &R,
    trust_store: &TrustStore,
    cid: &Cid,
    store: &B,
    scanner: &dyn VulnerabilityScanner,
    cancel: &CancellationToken,
) -> Result<(), SigningError>
where
    R: RegistryStore + ?Sized,
    B: SignatureStore<SignatureBundle> + ?Sized,
{
    verify_package(registry, trust_store, cid, store, cancel).await?;
    let desc = build_descriptor(registry, cid, cancel).await?;
    let (is_vulnerable, reason) = scanner.scan(&desc);
    if is_vulnerable {
        return Err(SigningError::Advisory(reason.unwrap_or_else(|| "unspecified".to_string())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{generate_keypair, issue_child, self_sign_root};
    use orizon_core::{PackageBlob, PackageManifest};
    use orizon_registry::{MemoryRegistry, MemorySignatureStore};
    use std::str::FromStr;

    async fn seeded() -> (MemoryRegistry, Cid) {
        let registry = MemoryRegistry::new();
        let cancel = CancellationToken::new();
        let manifest = PackageManifest::new(PackageId::new("a").unwrap(), Version::from_str("1.0.0").unwrap());
        let cid = registry
            .publish(PackageBlob { manifest, data: b"hello".to_vec() }, &cancel)
            .await
            .unwrap();
        (registry, cid)
    }

    #[tokio::test]
    async fn sign_and_verify_round_trip() {
        let (registry, cid) = seeded().await;
        let cancel = CancellationToken::new();

        let root_key = generate_keypair();
        let root = self_sign_root("root", &root_key, chrono::Duration::days(365));
        let leaf_key = generate_keypair();
        let leaf = issue_child(&root, &root_key, &leaf_key.verifying_key(), "publisher", chrono::Duration::days(30), &["package-sign"]);

        let mut trust_store = TrustStore::new();
        trust_store.add_trusted_root(&root).unwrap();

        let sig_store: MemorySignatureStore<SignatureBundle> = MemorySignatureStore::new();
        sign_package(&registry, &sig_store, &cid, &leaf_key, vec![leaf, root], &cancel)
            .await
            .unwrap();

        assert!(verify_package(&registry, &trust_store, &cid, &sig_store, &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn validate_package_security_fails_on_advisory_hit() {
        let (registry, cid) = seeded().await;
        let cancel = CancellationToken::new();

        let root_key = generate_keypair();
        let root = self_sign_root("root", &root_key, chrono::Duration::days(365));
        let leaf_key = generate_keypair();
        let leaf = issue_child(&root, &root_key, &leaf_key.verifying_key(), "publisher", chrono::Duration::days(30), &["package-sign"]);

        let mut trust_store = TrustStore::new();
        trust_store.add_trusted_root(&root).unwrap();

        let sig_store: MemorySignatureStore<SignatureBundle> = MemorySignatureStore::new();
        sign_package(&registry, &sig_store, &cid, &leaf_key, vec![leaf, root], &cancel)
            .await
            .unwrap();

        let scanner = InMemoryScanner::new();
        scanner.flag(cid.clone(), "test");

        let err = validate_package_security(&registry, &trust_store, &cid, &sig_store, &scanner, &cancel)
            .await
            .unwrap_err();
        match err {
            SigningError::Advisory(reason) => assert_eq!(reason, "test"),
            other => panic!("expected advisory error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_package_fails_with_no_bundles() {
        let (registry, cid) = seeded().await;
        let cancel = CancellationToken::new();
        let trust_store = TrustStore::new();
        let sig_store: MemorySignatureStore<SignatureBundle> = MemorySignatureStore::new();
        let err = verify_package(&registry, &trust_store, &cid, &sig_store, &cancel).await.unwrap_err();
        assert!(matches!(err, SigningError::NoValidSignature));
    }
}
