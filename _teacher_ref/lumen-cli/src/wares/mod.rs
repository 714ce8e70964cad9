pub mod cli;
pub mod client;
pub mod ops;
pub mod resolver;
pub mod storage;
pub mod trust;
pub mod types;

pub use client::{ClientConfig, RegistryClient};
pub use resolver::{
    ResolutionError, ResolutionPolicy, ResolutionRequest, ResolvedPackage, ResolvedSource, Resolver,
};
pub use storage::{R2Client, R2Config};
pub use trust::{TrustClient, TrustError};
pub use types::*;
