//! Ed25519 keypairs, certificate issuance and chain verification (spec
//! component C7, certificate half).

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use orizon_core::canonical_json_of;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("chain verification failed at index {index}: {reason}")]
    ChainVerificationFailed { index: usize, reason: String },
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("certificate expired or not yet valid")]
    Expired,
    #[error("no valid signature bundle")]
    NoValidSignature,
    #[error("signature key mismatch")]
    KeyMismatch,
    #[error("descriptor signature does not verify")]
    DescriptorSignatureInvalid,
    #[error(transparent)]
    Registry(#[from] orizon_registry::RegistryError),
    #[error("advisory hit: {0}")]
    Advisory(String),
}

impl From<SigningError> for orizon_core::OrizonError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::Registry(r) => r.into(),
            other => orizon_core::OrizonError::Signature(other.to_string()),
        }
    }
}

/// Stable key identifier: hex-encoded SHA-256 of a raw 32-byte Ed25519
/// public key.
pub type KeyId = String;

pub fn fingerprint(public_key: &VerifyingKey) -> KeyId {
    orizon_core::sha256_hex(public_key.as_bytes())
}

/// A certificate in the chain model (spec §3). The TBS (to-be-signed)
/// bytes are the canonical JSON of every field except `signature`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub serial: String,
    pub subject: String,
    pub issuer: String,
    /// Hex-encoded raw 32-byte Ed25519 public key.
    pub public_key: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub key_usage: BTreeSet<String>,
    pub extensions: BTreeMap<String, String>,
    /// Hex-encoded 64-byte Ed25519 signature over the TBS bytes.
    pub signature: String,
}

/// The fields that are actually signed; identical to [`Certificate`]
/// minus `signature`, so the TBS bytes are independent of any prior
/// signature value.
#[derive(Serialize)]
struct Tbs<'a> {
    serial: &'a str,
    subject: &'a str,
    issuer: &'a str,
    public_key: &'a str,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_usage: &'a BTreeSet<String>,
    extensions: &'a BTreeMap<String, String>,
}

impl Certificate {
    fn tbs_bytes(&self) -> Vec<u8> {
        canonical_json_of(&Tbs {
            serial: &self.serial,
            subject: &self.subject,
            issuer: &self.issuer,
            public_key: &self.public_key,
            not_before: self.not_before,
            not_after: self.not_after,
            key_usage: &self.key_usage,
            extensions: &self.extensions,
        })
    }

    pub fn public_key(&self) -> Result<VerifyingKey, SigningError> {
        decode_public_key(&self.public_key)
    }

    pub fn fingerprint(&self) -> Result<KeyId, SigningError> {
        Ok(fingerprint(&self.public_key()?))
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.not_after
    }

    /// Verify this certificate's signature against `issuer_pub` and that
    /// `now` falls within its validity window.
    pub fn verify(&self, issuer_pub: &VerifyingKey, now: DateTime<Utc>) -> Result<(), SigningError> {
        if !self.is_valid_at(now) {
            return Err(SigningError::Expired);
        }
        let sig_bytes = decode_signature(&self.signature)?;
        issuer_pub
            .verify(&self.tbs_bytes(), &sig_bytes)
            .map_err(|_| SigningError::InvalidCertificate("signature does not verify".to_string()))
    }
}

fn decode_public_key(hex_str: &str) -> Result<VerifyingKey, SigningError> {
    let bytes = hex::decode(hex_str).map_err(|e| SigningError::InvalidCertificate(e.to_string()))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidCertificate("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&array).map_err(|e| SigningError::InvalidCertificate(e.to_string()))
}

fn decode_signature(hex_str: &str) -> Result<ed25519_dalek::Signature, SigningError> {
    let bytes = hex::decode(hex_str).map_err(|e| SigningError::InvalidCertificate(e.to_string()))?;
    let array: [u8; 64] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidCertificate("signature must be 64 bytes".to_string()))?;
    Ok(ed25519_dalek::Signature::from_bytes(&array))
}

/// Generate a fresh Ed25519 keypair.
pub fn generate_keypair() -> SigningKey {
    let mut rng = rand::rngs::OsRng;
    SigningKey::generate(&mut rng)
}

fn sign_tbs(signing_key: &SigningKey, tbs: &[u8]) -> String {
    hex::encode(signing_key.sign(tbs).to_bytes())
}

/// Issue a self-signed root certificate: `issuer == subject`, signed by
/// `keypair`'s own private key. Usages default to the three the spec
/// names: `cert-sign`, `package-sign`, `lockfile-sign`.
pub fn self_sign_root(subject: &str, keypair: &SigningKey, validity: chrono::Duration) -> Certificate {
    let now = Utc::now();
    let public_key = hex::encode(keypair.verifying_key().as_bytes());
    let key_usage: BTreeSet<String> = ["cert-sign", "package-sign", "lockfile-sign"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut cert = Certificate {
        serial: uuid::Uuid::new_v4().to_string(),
        subject: subject.to_string(),
        issuer: subject.to_string(),
        public_key,
        not_before: now,
        not_after: now + validity,
        key_usage,
        extensions: BTreeMap::new(),
        signature: String::new(),
    };
    cert.signature = sign_tbs(keypair, &cert.tbs_bytes());
    cert
}

/// Issue a child certificate, signed by `parent_priv` (the issuing
/// certificate's private key).
pub fn issue_child(
    parent_cert: &Certificate,
    parent_priv: &SigningKey,
    child_pub: &VerifyingKey,
    subject: &str,
    validity: chrono::Duration,
    usages: &[&str],
) -> Certificate {
    let now = Utc::now();
    let mut cert = Certificate {
        serial: uuid::Uuid::new_v4().to_string(),
        subject: subject.to_string(),
        issuer: parent_cert.subject.clone(),
        public_key: hex::encode(child_pub.as_bytes()),
        not_before: now,
        not_after: now + validity,
        key_usage: usages.iter().map(|s| s.to_string()).collect(),
        extensions: BTreeMap::new(),
        signature: String::new(),
    };
    cert.signature = sign_tbs(parent_priv, &cert.tbs_bytes());
    cert
}

/// Verify `cert`'s signature against `issuer_pub` and its validity
/// window at the current time.
pub fn verify_cert(cert: &Certificate, issuer_pub: &VerifyingKey) -> Result<(), SigningError> {
    cert.verify(issuer_pub, Utc::now())
}

/// Set of trusted root public keys (by fingerprint), plus optionally
/// known intermediates, against which certificate chains are verified.
#[derive(Default)]
pub struct TrustStore {
    roots: HashMap<KeyId, VerifyingKey>,
    intermediates: HashMap<KeyId, Certificate>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trusted_root(&mut self, cert: &Certificate) -> Result<(), SigningError> {
        let public_key = cert.public_key()?;
        self.roots.insert(fingerprint(&public_key), public_key);
        Ok(())
    }

    pub fn add_known_intermediate(&mut self, cert: Certificate) -> Result<(), SigningError> {
        let fp = cert.fingerprint()?;
        self.intermediates.insert(fp, cert);
        Ok(())
    }

    pub fn is_trusted_root(&self, fp: &str) -> bool {
        self.roots.contains_key(fp)
    }

    /// Verify a leaf-first chain `[leaf, ..., root]`: each intermediate's
    /// signature verifies against the next certificate's public key, the
    /// root's self-signature verifies, and the root's fingerprint is in
    /// the trusted set.
    pub fn verify_chain(&self, chain: &[Certificate]) -> Result<(), SigningError> {
        if chain.is_empty() {
            return Err(SigningError::ChainVerificationFailed {
                index: 0,
                reason: "empty chain".to_string(),
            });
        }

        let now = Utc::now();
        for i in 0..chain.len() - 1 {
            let issuer_pub = chain[i + 1].public_key().map_err(|e| SigningError::ChainVerificationFailed {
                index: i,
                reason: e.to_string(),
            })?;
            chain[i]
                .verify(&issuer_pub, now)
                .map_err(|e| SigningError::ChainVerificationFailed { index: i, reason: e.to_string() })?;
        }

        let root = chain.last().expect("chain is non-empty");
        let root_pub = root.public_key().map_err(|e| SigningError::ChainVerificationFailed {
            index: chain.len() - 1,
            reason: e.to_string(),
        })?;
        if root.issuer != root.subject {
            return Err(SigningError::ChainVerificationFailed {
                index: chain.len() - 1,
                reason: "root certificate is not self-issued".to_string(),
            });
        }
        root.verify(&root_pub, now).map_err(|e| SigningError::ChainVerificationFailed {
            index: chain.len() - 1,
            reason: e.to_string(),
        })?;

        let root_fp = fingerprint(&root_pub);
        if !self.is_trusted_root(&root_fp) {
            return Err(SigningError::ChainVerificationFailed {
                index: chain.len() - 1,
                reason: "root is not in the trust store".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_signed_root_verifies() {
        let key = generate_keypair();
        let root = self_sign_root("root", &key, chrono::Duration::days(365));
        assert_eq!(root.issuer, root.subject);
        assert!(verify_cert(&root, &key.verifying_key()).is_ok());
    }

    #[test]
    fn child_chain_verifies_through_trust_store() {
        let root_key = generate_keypair();
        let root = self_sign_root("root", &root_key, chrono::Duration::days(365));

        let child_key = generate_keypair();
        let child = issue_child(
            &root,
            &root_key,
            &child_key.verifying_key(),
            "child",
            chrono::Duration::days(30),
            &["package-sign"],
        );

        let mut store = TrustStore::new();
        store.add_trusted_root(&root).unwrap();

        assert!(store.verify_chain(&[child, root]).is_ok());
    }

    #[test]
    fn altering_any_field_breaks_verification() {
        let root_key = generate_keypair();
        let root = self_sign_root("root", &root_key, chrono::Duration::days(365));
        let child_key = generate_keypair();
        let mut child = issue_child(&root, &root_key, &child_key.verifying_key(), "child", chrono::Duration::days(30), &["package-sign"]);

        let mut store = TrustStore::new();
        store.add_trusted_root(&root).unwrap();
        assert!(store.verify_chain(&[child.clone(), root.clone()]).is_ok());

        child.subject = "tampered".to_string();
        assert!(store.verify_chain(&[child, root]).is_err());
    }

    #[test]
    fn untrusted_root_is_rejected() {
        let root_key = generate_keypair();
        let root = self_sign_root("root", &root_key, chrono::Duration::days(365));
        let child_key = generate_keypair();
        let child = issue_child(&root, &root_key, &child_key.verifying_key(), "child", chrono::Duration::days(30), &["package-sign"]);

        let store = TrustStore::new();
        assert!(store.verify_chain(&[child, root]).is_err());
    }
}
