//! The CLI's local signing identity: a persisted Ed25519 keypair plus its
//! self-signed root certificate, and the set of roots this workspace
//! trusts when verifying. Both live under `<workspace>/.orizon/`.

use ed25519_dalek::SigningKey;
use orizon_signing::{self_sign_root, Certificate, TrustStore};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed identity: {0}")]
    Malformed(String),
}

fn key_path(workspace: &Path) -> PathBuf {
    workspace.join(".orizon").join("identity_key.hex")
}

fn cert_path(workspace: &Path) -> PathBuf {
    workspace.join(".orizon").join("identity_cert.json")
}

fn trusted_roots_path(workspace: &Path) -> PathBuf {
    workspace.join(".orizon").join("trusted_roots.json")
}

pub struct Identity {
    pub signing_key: SigningKey,
    pub root_cert: Certificate,
}

impl Identity {
    /// Load this workspace's signing identity, generating and persisting
    /// a fresh self-signed root for `subject` on first use. `subject` is
    /// ignored once an identity already exists.
    pub fn load_or_create(workspace: &Path, subject: &str) -> Result<Self, IdentityError> {
        let key_path = key_path(workspace);
        let cert_path = cert_path(workspace);

        if key_path.exists() && cert_path.exists() {
            let hex_seed = std::fs::read_to_string(&key_path)?;
            let seed_bytes = hex::decode(hex_seed.trim()).map_err(|e| IdentityError::Malformed(e.to_string()))?;
            let seed: [u8; 32] = seed_bytes
                .try_into()
                .map_err(|_| IdentityError::Malformed("identity key must be 32 bytes".to_string()))?;
            let signing_key = SigningKey::from_bytes(&seed);

            let cert_bytes = std::fs::read(&cert_path)?;
            let root_cert: Certificate =
                serde_json::from_slice(&cert_bytes).map_err(|e| IdentityError::Malformed(e.to_string()))?;

            return Ok(Self { signing_key, root_cert });
        }

        let signing_key = orizon_signing::generate_keypair();
        let root_cert = self_sign_root(subject, &signing_key, chrono::Duration::days(365));
        let identity = Self { signing_key, root_cert };
        identity.save(workspace)?;
        Ok(identity)
    }

    fn save(&self, workspace: &Path) -> Result<(), IdentityError> {
        let dir = workspace.join(".orizon");
        std::fs::create_dir_all(&dir)?;

        let key_path = key_path(workspace);
        let hex_seed = hex::encode(self.signing_key.to_bytes());
        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&key_path)?;
        file.write_all(hex_seed.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(&key_path)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o600);
            std::fs::set_permissions(&key_path, permissions)?;
        }

        let cert_bytes =
            serde_json::to_vec_pretty(&self.root_cert).map_err(|e| IdentityError::Malformed(e.to_string()))?;
        std::fs::write(cert_path(workspace), cert_bytes)?;

        Ok(())
    }
}

/// The roots a workspace trusts, persisted as a flat list of
/// certificates rather than a [`TrustStore`] (whose public keys don't
/// derive `Serialize`).
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct TrustedRootsFile {
    #[serde(default)]
    roots: Vec<Certificate>,
}

pub fn load_trust_store(workspace: &Path) -> Result<TrustStore, IdentityError> {
    let path = trusted_roots_path(workspace);
    let mut store = TrustStore::new();
    if !path.exists() {
        return Ok(store);
    }
    let bytes = std::fs::read(&path)?;
    let file: TrustedRootsFile = serde_json::from_slice(&bytes).map_err(|e| IdentityError::Malformed(e.to_string()))?;
    for cert in &file.roots {
        store
            .add_trusted_root(cert)
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;
    }
    Ok(store)
}

/// Add `cert` to the workspace's trusted roots, creating the file if
/// necessary. Idempotent on repeated calls with the same certificate.
pub fn trust_root(workspace: &Path, cert: &Certificate) -> Result<(), IdentityError> {
    let path = trusted_roots_path(workspace);
    let mut file = if path.exists() {
        let bytes = std::fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| IdentityError::Malformed(e.to_string()))?
    } else {
        TrustedRootsFile::default()
    };
    if !file.roots.iter().any(|c| c.public_key == cert.public_key && c.serial == cert.serial) {
        file.roots.push(cert.clone());
    }
    std::fs::create_dir_all(workspace.join(".orizon"))?;
    let bytes = serde_json::to_vec_pretty(&file).map_err(|e| IdentityError::Malformed(e.to_string()))?;
    std::fs::write(&path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let first = Identity::load_or_create(dir.path(), "me").unwrap();
        let second = Identity::load_or_create(dir.path(), "ignored").unwrap();
        assert_eq!(first.signing_key.to_bytes(), second.signing_key.to_bytes());
        assert_eq!(first.root_cert, second.root_cert);
    }

    #[test]
    fn trusting_own_root_makes_it_verifiable() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity::load_or_create(dir.path(), "me").unwrap();
        trust_root(dir.path(), &identity.root_cert).unwrap();

        let store = load_trust_store(dir.path()).unwrap();
        assert!(store.verify_chain(std::slice::from_ref(&identity.root_cert)).is_ok());
    }
}
