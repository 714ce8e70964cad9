//! Content identifiers (CIDs).
//!
//! A CID is a pure function of a blob's bytes: a fixed ASCII prefix
//! followed by the lowercase hex SHA-256 digest of the input. Two blobs
//! with identical `data` always produce identical CIDs, regardless of
//! their manifests.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Prefix prepended to every content identifier this registry mints.
pub const CID_PREFIX: &str = "oz1-";

/// A content identifier: `oz1-<sha256 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid(String);

impl Cid {
    /// Compute the CID of the given bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        Cid(format!("{}{}", CID_PREFIX, hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw hex digest, with the CID prefix stripped.
    pub fn digest_hex(&self) -> &str {
        self.0.strip_prefix(CID_PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cid {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digest = s
            .strip_prefix(CID_PREFIX)
            .ok_or_else(|| CidError::InvalidCid(s.to_string()))?;
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(CidError::InvalidCid(s.to_string()));
        }
        Ok(Cid(s.to_string()))
    }
}

impl serde::Serialize for Cid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Cid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidError {
    #[error("invalid content identifier: {0}")]
    InvalidCid(String),
}

/// Compute the CID of a byte slice (functional form, for call sites that
/// don't want the `Cid` wrapper).
pub fn compute_cid(data: &[u8]) -> Cid {
    Cid::compute(data)
}

/// Hex-encoded SHA-256 of `data`, used by the lockfile engine alongside
/// the CID to double-check blob integrity.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_is_pure() {
        let a = Cid::compute(b"hello");
        let b = Cid::compute(b"hello");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with(CID_PREFIX));
    }

    #[test]
    fn different_bytes_different_cid() {
        let a = Cid::compute(b"hello");
        let b = Cid::compute(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_string() {
        let a = Cid::compute(b"round trip me");
        let parsed: Cid = a.as_str().parse().unwrap();
        assert_eq!(a, parsed);
    }

    #[test]
    fn rejects_malformed_cid() {
        assert!("not-a-cid".parse::<Cid>().is_err());
        assert!("oz1-tooshort".parse::<Cid>().is_err());
    }
}
