//! Project manifest I/O: `orizon.json` at the workspace root (spec §6).
//!
//! A missing manifest is not an error: callers get the implicit default
//! `{name:"app", version:"0.1.0", dependencies:{}}`.

use orizon_core::{Constraint, PackageId, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "orizon.json";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed manifest: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            version: "0.1.0".to_string(),
            dependencies: BTreeMap::new(),
        }
    }
}

impl Manifest {
    pub fn path(workspace: &Path) -> std::path::PathBuf {
        workspace.join(MANIFEST_FILE)
    }

    pub fn exists(workspace: &Path) -> bool {
        Self::path(workspace).exists()
    }

    /// Load the manifest, or the implicit default if the file is absent.
    pub fn load(workspace: &Path) -> Result<Self, ManifestError> {
        let path = Self::path(workspace);
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| ManifestError::Malformed(e.to_string()))
    }

    pub fn save(&self, workspace: &Path) -> Result<(), ManifestError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| ManifestError::Malformed(e.to_string()))?;
        std::fs::write(Self::path(workspace), bytes)?;
        Ok(())
    }

    pub fn package_id(&self) -> Result<PackageId, ManifestError> {
        PackageId::new(self.name.clone()).map_err(|e| ManifestError::Malformed(e.to_string()))
    }

    pub fn parsed_version(&self) -> Result<Version, ManifestError> {
        Version::from_str(&self.version).map_err(|e| ManifestError::Malformed(e.to_string()))
    }

    /// Dependency roots, name-sorted, with constraints parsed (spec §4.4
    /// requires sorted root iteration order for determinism).
    pub fn roots(&self) -> Result<Vec<(PackageId, Constraint)>, ManifestError> {
        let mut out = Vec::with_capacity(self.dependencies.len());
        for (name, constraint) in &self.dependencies {
            let pkg = PackageId::new(name.clone()).map_err(|e| ManifestError::Malformed(e.to_string()))?;
            let parsed = Constraint::parse(constraint).map_err(|e| ManifestError::Malformed(e.to_string()))?;
            out.push((pkg, parsed));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_yields_implicit_default() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::default();
        manifest.dependencies.insert("left-pad".to_string(), ">=1.0.0".to_string());
        manifest.save(dir.path()).unwrap();

        let loaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn roots_are_sorted_by_name() {
        let mut manifest = Manifest::default();
        manifest.dependencies.insert("zeta".to_string(), ">=1.0.0".to_string());
        manifest.dependencies.insert("alpha".to_string(), ">=1.0.0".to_string());
        let roots = manifest.roots().unwrap();
        assert_eq!(roots[0].0.as_str(), "alpha");
        assert_eq!(roots[1].0.as_str(), "zeta");
    }
}
