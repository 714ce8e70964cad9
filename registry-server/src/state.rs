//! Server configuration (read from the `ORIZON_REGISTRY_*` environment
//! variables, spec §6) and the shared [`AppState`] every handler closes
//! over.

use crate::metrics::Metrics;
use crate::ratelimit::TokenBucket;
use orizon_registry::RegistryStore;
use orizon_validate::Validator;
use std::sync::Arc;

const DEFAULT_MAX_PUBLISH_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// Only `/publish` requires the bearer token.
    Write,
    /// Every read endpoint requires it too.
    ReadWrite,
}

pub struct Config {
    pub addr: String,
    pub token: Option<String>,
    pub auth_mode: AuthMode,
    pub max_publish_bytes: usize,
    pub cors_origins: CorsOrigins,
    pub access_log: bool,
    pub rate_limit: Option<(f64, f64)>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

impl Config {
    pub fn from_env() -> Self {
        let addr = std::env::var("ORIZON_REGISTRY_ADDR").unwrap_or_else(|_| "127.0.0.1:8787".to_string());
        let token = std::env::var("ORIZON_REGISTRY_TOKEN").ok().filter(|t| !t.is_empty());
        let auth_mode = match std::env::var("ORIZON_REGISTRY_AUTH_MODE").as_deref() {
            Ok("readwrite") => AuthMode::ReadWrite,
            _ => AuthMode::Write,
        };
        let max_publish_bytes = std::env::var("ORIZON_REGISTRY_MAX_PUBLISH_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_PUBLISH_BYTES);
        let cors_origins = match std::env::var("ORIZON_REGISTRY_CORS_ORIGINS") {
            Ok(v) if v.trim() == "*" => CorsOrigins::Any,
            Ok(v) => CorsOrigins::List(v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()),
            Err(_) => CorsOrigins::Any,
        };
        let access_log = matches!(std::env::var("ORIZON_REGISTRY_ACCESS_LOG").as_deref(), Ok("1") | Ok("true"));
        let rate_limit = std::env::var("ORIZON_REGISTRY_RATE_QPS")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|qps| *qps > 0.0)
            .map(|qps| {
                let burst = std::env::var("ORIZON_REGISTRY_RATE_BURST")
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok())
                    .filter(|b| *b >= 0.0)
                    .unwrap_or(qps);
                (qps, burst)
            });
        let tls_cert = std::env::var("ORIZON_REGISTRY_TLS_CERT").ok();
        let tls_key = std::env::var("ORIZON_REGISTRY_TLS_KEY").ok();

        Self {
            addr,
            token,
            auth_mode,
            max_publish_bytes,
            cors_origins,
            access_log,
            rate_limit,
            tls_cert,
            tls_key,
        }
    }
}

pub struct AppState {
    pub registry: Arc<dyn RegistryStore>,
    pub token: Option<String>,
    pub auth_mode: AuthMode,
    pub max_publish_bytes: usize,
    pub access_log: bool,
    pub validator: Validator,
    pub rate_limiter: Option<TokenBucket>,
    pub metrics: Metrics,
    pub tls_enabled: bool,
}

impl AppState {
    pub fn new(registry: Arc<dyn RegistryStore>, config: &Config) -> Self {
        Self {
            registry,
            token: config.token.clone(),
            auth_mode: config.auth_mode,
            max_publish_bytes: config.max_publish_bytes,
            access_log: config.access_log,
            validator: Validator::default(),
            rate_limiter: config.rate_limit.map(|(qps, burst)| TokenBucket::new(burst, qps)),
            metrics: Metrics::default(),
            tls_enabled: config.tls_cert.is_some() && config.tls_key.is_some(),
        }
    }

    /// Whether `path` requires the bearer token under the active auth
    /// mode. `/publish` always does if a token is configured; read
    /// endpoints only do under `readwrite`.
    pub fn requires_auth(&self, path: &str) -> bool {
        if self.token.is_none() {
            return false;
        }
        match path {
            "/publish" => true,
            "/healthz" | "/metrics" => false,
            _ => self.auth_mode == AuthMode::ReadWrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orizon_registry::MemoryRegistry;

    fn state_with(token: Option<&str>, auth_mode: AuthMode) -> AppState {
        let config = Config {
            addr: "127.0.0.1:0".into(),
            token: token.map(str::to_string),
            auth_mode,
            max_publish_bytes: 1024,
            cors_origins: CorsOrigins::Any,
            access_log: false,
            rate_limit: None,
            tls_cert: None,
            tls_key: None,
        };
        AppState::new(Arc::new(MemoryRegistry::new()), &config)
    }

    #[test]
    fn write_mode_only_protects_publish() {
        let state = state_with(Some("tok"), AuthMode::Write);
        assert!(state.requires_auth("/publish"));
        assert!(!state.requires_auth("/fetch"));
        assert!(!state.requires_auth("/healthz"));
    }

    #[test]
    fn readwrite_mode_protects_reads_too() {
        let state = state_with(Some("tok"), AuthMode::ReadWrite);
        assert!(state.requires_auth("/publish"));
        assert!(state.requires_auth("/fetch"));
        assert!(!state.requires_auth("/healthz"));
        assert!(!state.requires_auth("/metrics"));
    }

    #[test]
    fn no_token_configured_means_nothing_is_protected() {
        let state = state_with(None, AuthMode::ReadWrite);
        assert!(!state.requires_auth("/publish"));
        assert!(!state.requires_auth("/fetch"));
    }
}
