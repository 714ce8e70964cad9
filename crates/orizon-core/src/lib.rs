//! Shared primitives for the Orizon package core: content identifiers,
//! canonical JSON, semantic versioning, and the package/blob data model.

pub mod canonical;
pub mod cid;
pub mod error;
pub mod model;
pub mod semver;

pub use canonical::{canonical_json, canonical_json_of};
pub use cid::{compute_cid, sha256_hex, Cid, CidError};
pub use error::OrizonError;
pub use model::{ModelError, PackageBlob, PackageId, PackageManifest};
pub use semver::{Constraint, SemverError, Version};
