//! `<workspace>/.orizon/credentials.json`: per-registry bearer tokens
//! (spec §6). Written owner-read/write only, matching the on-disk
//! permissions of every other secret this workspace persists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CREDENTIALS_DIR: &str = ".orizon";
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed credentials file: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryCredentials {
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub registries: BTreeMap<String, RegistryCredentials>,
}

impl Credentials {
    fn path(workspace: &Path) -> PathBuf {
        workspace.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE)
    }

    pub fn load(workspace: &Path) -> Result<Self, CredentialsError> {
        let path = Self::path(workspace);
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| CredentialsError::Malformed(e.to_string()))
    }

    pub fn token_for(&self, base_url: &str) -> Option<&str> {
        self.registries.get(base_url).map(|c| c.token.as_str())
    }

    pub fn set_token(&mut self, base_url: impl Into<String>, token: impl Into<String>) {
        self.registries.insert(base_url.into(), RegistryCredentials { token: token.into() });
    }

    pub fn save(&self, workspace: &Path) -> Result<(), CredentialsError> {
        let dir = workspace.join(CREDENTIALS_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = Self::path(workspace);
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| CredentialsError::Malformed(e.to_string()))?;

        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let mut file = opts.open(&path)?;
        file.write_all(&bytes)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(&path)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o600);
            std::fs::set_permissions(&path, permissions)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let creds = Credentials::load(dir.path()).unwrap();
        assert!(creds.registries.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut creds = Credentials::default();
        creds.set_token("https://registry.example/", "secret-token");
        creds.save(dir.path()).unwrap();

        let loaded = Credentials::load(dir.path()).unwrap();
        assert_eq!(loaded.token_for("https://registry.example/"), Some("secret-token"));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut creds = Credentials::default();
        creds.set_token("https://registry.example/", "secret-token");
        creds.save(dir.path()).unwrap();

        let path = dir.path().join(CREDENTIALS_DIR).join(CREDENTIALS_FILE);
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
