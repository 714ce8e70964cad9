//! Resolves the `--registry` flag / `ORIZON_REGISTRY` env var to a
//! concrete [`RegistryStore`] backend: an `http(s)://` URL selects the
//! HTTP client, anything else is treated as a local file-registry path.

use crate::credentials::Credentials;
use orizon_registry::{FileRegistry, HttpRegistry, RegistryError, RegistryStore};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_REGISTRY_PATH: &str = ".orizon/registry";

pub fn registry_spec(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("ORIZON_REGISTRY").ok())
        .unwrap_or_else(|| DEFAULT_REGISTRY_PATH.to_string())
}

/// `--token` flag, then `ORIZON_REGISTRY_TOKEN`, then the workspace's
/// `.orizon/credentials.json` entry for `spec` (spec §6).
pub fn registry_token(flag: Option<String>, workspace: &Path, spec: &str) -> Option<String> {
    flag.or_else(|| std::env::var("ORIZON_REGISTRY_TOKEN").ok())
        .or_else(|| Credentials::load(workspace).ok()?.token_for(spec).map(str::to_string))
}

/// Open the registry backend named by `spec`. `http://`/`https://` spec
/// values select [`HttpRegistry`]; everything else opens (or creates) a
/// [`FileRegistry`] at that path.
pub fn open_registry(spec: &str, token: Option<String>) -> Result<Arc<dyn RegistryStore>, RegistryError> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        Ok(Arc::new(HttpRegistry::new(spec, token)))
    } else {
        Ok(Arc::new(FileRegistry::open(spec)?))
    }
}
