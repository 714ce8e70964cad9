//! Top-level error taxonomy shared across the workspace.
//!
//! Each component's own `thiserror` enum (see `orizon-resolver`'s
//! `ResolutionError`, `orizon-lockfile`'s `LockfileError`, `orizon-signing`'s
//! `SigningError`, etc.) converts into `OrizonError` at crate boundaries so
//! the CLI and HTTP server can map a single taxonomy to exit codes / status
//! codes (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrizonError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid package id: {0}")]
    InvalidPackageId(String),

    #[error("invalid content identifier: {0}")]
    InvalidCid(String),

    #[error("dependency conflict on {package}: {reason}")]
    Conflict {
        package: String,
        reason: String,
        tried_versions: Vec<String>,
    },

    #[error("dependency cycle: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited")]
    RateLimited,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("io failure: {0}")]
    Io(String),

    #[error("cancelled")]
    Cancelled,
}

impl OrizonError {
    /// Exit-code category used by the CLI (spec §7): runtime errors exit
    /// 1, nothing in this enum maps to usage errors (2) — those are raised
    /// directly by `clap`.
    pub fn category(&self) -> &'static str {
        match self {
            OrizonError::NotFound(_) => "NotFound",
            OrizonError::InvalidConstraint(_) => "InvalidConstraint",
            OrizonError::InvalidVersion(_) => "InvalidVersion",
            OrizonError::InvalidPackageId(_) => "InvalidPackageID",
            OrizonError::InvalidCid(_) => "InvalidCID",
            OrizonError::Conflict { .. } => "ConflictError",
            OrizonError::Cycle { .. } => "CycleError",
            OrizonError::Integrity(_) => "IntegrityError",
            OrizonError::Signature(_) => "SignatureError",
            OrizonError::Unauthorized => "Unauthorized",
            OrizonError::RateLimited => "RateLimited",
            OrizonError::PayloadTooLarge => "PayloadTooLarge",
            OrizonError::Io(_) => "IOFailure",
            OrizonError::Cancelled => "Cancelled",
        }
    }

    /// One-line `error: <category>: <reason>` rendering for CLI output.
    pub fn one_line(&self) -> String {
        format!("error: {}: {}", self.category(), self)
    }
}

impl From<std::io::Error> for OrizonError {
    fn from(e: std::io::Error) -> Self {
        OrizonError::Io(e.to_string())
    }
}

impl From<crate::cid::CidError> for OrizonError {
    fn from(e: crate::cid::CidError) -> Self {
        OrizonError::InvalidCid(e.to_string())
    }
}

impl From<crate::semver::SemverError> for OrizonError {
    fn from(e: crate::semver::SemverError) -> Self {
        match e {
            crate::semver::SemverError::InvalidConstraint(_) => OrizonError::InvalidConstraint(e.to_string()),
            _ => OrizonError::InvalidVersion(e.to_string()),
        }
    }
}

impl From<crate::model::ModelError> for OrizonError {
    fn from(e: crate::model::ModelError) -> Self {
        match e {
            crate::model::ModelError::InvalidPackageId(_) => OrizonError::InvalidPackageId(e.to_string()),
            crate::model::ModelError::InvalidConstraint(_) => OrizonError::InvalidConstraint(e.to_string()),
        }
    }
}
