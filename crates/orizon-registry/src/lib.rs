//! Content-addressed package stores: the in-memory, file-backed and HTTP
//! client back-ends behind a single [`RegistryStore`] trait, plus the
//! append-only signature store.

mod file;
mod http;
mod memory;
mod signatures;

pub use file::FileRegistry;
pub use http::HttpRegistry;
pub use memory::MemoryRegistry;
pub use signatures::{FileSignatureStore, MemorySignatureStore, SignatureStore};

use async_trait::async_trait;
use orizon_core::{Cid, Constraint, PackageBlob, PackageId, PackageManifest};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
    #[error("io failure: {0}")]
    Io(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("cancelled")]
    Cancelled,
}

impl From<std::io::Error> for RegistryError {
    fn from(e: std::io::Error) -> Self {
        RegistryError::Io(e.to_string())
    }
}

impl From<orizon_core::SemverError> for RegistryError {
    fn from(e: orizon_core::SemverError) -> Self {
        RegistryError::InvalidConstraint(e.to_string())
    }
}

impl From<RegistryError> for orizon_core::OrizonError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(s) => orizon_core::OrizonError::NotFound(s),
            RegistryError::InvalidConstraint(s) => orizon_core::OrizonError::InvalidConstraint(s),
            RegistryError::Io(s) => orizon_core::OrizonError::Io(s),
            RegistryError::Unauthorized => orizon_core::OrizonError::Unauthorized,
            RegistryError::RateLimited => orizon_core::OrizonError::RateLimited,
            RegistryError::PayloadTooLarge => orizon_core::OrizonError::PayloadTooLarge,
            RegistryError::Cancelled => orizon_core::OrizonError::Cancelled,
        }
    }
}

pub(crate) fn check_cancelled(token: &CancellationToken) -> Result<(), RegistryError> {
    if token.is_cancelled() {
        Err(RegistryError::Cancelled)
    } else {
        Ok(())
    }
}

/// Uniform operation set implemented by every registry back-end (spec
/// component C3): publish, fetch, find and enumerate packages.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Store `blob`, returning its content identifier. Idempotent: the
    /// same bytes always produce the same CID and are never duplicated.
    async fn publish(&self, blob: PackageBlob, cancel: &CancellationToken) -> Result<Cid, RegistryError>;

    /// Retrieve the blob addressed by `cid`.
    async fn fetch(&self, cid: &Cid, cancel: &CancellationToken) -> Result<PackageBlob, RegistryError>;

    /// Highest version of `name` matching `constraint` (or any version, if
    /// `constraint` is `None`).
    async fn find(
        &self,
        name: &PackageId,
        constraint: Option<&Constraint>,
        cancel: &CancellationToken,
    ) -> Result<(Cid, PackageManifest), RegistryError>;

    /// All manifests for `name`, ascending by semver, deduplicated.
    async fn list(&self, name: &PackageId, cancel: &CancellationToken) -> Result<Vec<PackageManifest>, RegistryError>;

    /// Every manifest known to the store, sorted by (name, version).
    async fn all(&self, cancel: &CancellationToken) -> Result<Vec<PackageManifest>, RegistryError>;
}

/// Pick the highest-version manifest among `candidates` matching
/// `constraint`, shared by every back-end's `find` implementation.
pub(crate) fn select_best<'a>(
    candidates: &'a [PackageManifest],
    constraint: Option<&Constraint>,
) -> Option<&'a PackageManifest> {
    candidates
        .iter()
        .filter(|m| constraint.map(|c| c.matches(&m.version)).unwrap_or(true))
        .max_by(|a, b| a.version.cmp(&b.version))
}

/// Sort and deduplicate manifests by (name, version), as every back-end's
/// `list`/`all` must return them.
pub(crate) fn sorted_dedup(mut manifests: Vec<PackageManifest>) -> Vec<PackageManifest> {
    manifests.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
    manifests.dedup_by(|a, b| a.name == b.name && a.version == b.version);
    manifests
}
