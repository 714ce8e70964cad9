//! Core data model shared by the registry, resolver, lockfile and signing
//! crates: package identity, manifests and blobs.

use crate::semver::{Constraint, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque package identifier: non-empty, printable ASCII plus `_-./`,
/// starting with an alphanumeric character, length <= 255.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    pub fn new(s: impl Into<String>) -> Result<Self, ModelError> {
        let s = s.into();
        validate_package_id(&s)?;
        Ok(PackageId(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PackageId {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageId::new(s)
    }
}

impl TryFrom<String> for PackageId {
    type Error = ModelError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        PackageId::new(s)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

fn validate_package_id(s: &str) -> Result<(), ModelError> {
    if s.is_empty() || s.len() > 255 {
        return Err(ModelError::InvalidPackageId(s.to_string()));
    }
    let mut chars = s.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err(ModelError::InvalidPackageId(s.to_string()));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_graphic() && (c.is_ascii_alphanumeric() || "_-./".contains(c)))
    {
        return Err(ModelError::InvalidPackageId(s.to_string()));
    }
    Ok(())
}

/// A package's declared manifest: identity, version and dependency
/// constraints. Invariant upheld by the registry index, not this type:
/// for every dependency `(name, constraint)` of a listed package, `name`
/// must itself be listable in the same index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: PackageId,
    #[serde(with = "version_serde")]
    pub version: Version,
    /// Ordered `(name, constraint)` pairs, preserved in declaration order.
    #[serde(default)]
    pub dependencies: Vec<(PackageId, String)>,
}

impl PackageManifest {
    pub fn new(name: PackageId, version: Version) -> Self {
        Self {
            name,
            version,
            dependencies: Vec::new(),
        }
    }

    /// Parsed constraints, in declaration order. Fails if any dependency's
    /// constraint text does not parse.
    pub fn parsed_dependencies(&self) -> Result<Vec<(PackageId, Constraint)>, ModelError> {
        self.dependencies
            .iter()
            .map(|(name, c)| {
                Constraint::parse(c)
                    .map(|parsed| (name.clone(), parsed))
                    .map_err(|e| ModelError::InvalidConstraint(e.to_string()))
            })
            .collect()
    }
}

/// A published blob: the manifest that identifies it plus its opaque
/// payload. The core never interprets `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageBlob {
    pub manifest: PackageManifest,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
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

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid package id: {0}")]
    InvalidPackageId(String),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_ids() {
        assert!(PackageId::new("acme.http-utils_v2").is_ok());
    }

    #[test]
    fn rejects_empty_and_non_alnum_start() {
        assert!(PackageId::new("").is_err());
        assert!(PackageId::new("-leading-dash").is_err());
        assert!(PackageId::new("_leading-underscore").is_err());
    }

    #[test]
    fn rejects_oversized_ids() {
        let long = "a".repeat(256);
        assert!(PackageId::new(long).is_err());
    }

    #[test]
    fn manifest_roundtrips_through_json() {
        let name = PackageId::new("pkg").unwrap();
        let version = Version::from_str("1.0.0").unwrap();
        let mut manifest = PackageManifest::new(name, version);
        manifest
            .dependencies
            .push((PackageId::new("dep").unwrap(), ">=1.0.0".to_string()));
        let json = serde_json::to_string(&manifest).unwrap();
        let back: PackageManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, back);
    }
}
