//! Structural and pattern-based validation for externally sourced strings,
//! JSON documents and URLs, plus redacted security event logging.
//!
//! Every string or JSON document that crosses a trust boundary (an HTTP
//! request body, a query parameter, a manifest read from disk on behalf of
//! a remote peer) is expected to pass through this module before use.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Limits enforced by [`Validator`]. Defaults are generous but finite.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_json_bytes: usize,
    pub max_string_len: usize,
    pub max_array_len: usize,
    pub max_object_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_json_bytes: 8 * 1024 * 1024,
            max_string_len: 64 * 1024,
            max_array_len: 16 * 1024,
            max_object_depth: 32,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value exceeds maximum size ({0} bytes)")]
    TooLarge(usize),
    #[error("string exceeds maximum length ({0} chars)")]
    StringTooLong(usize),
    #[error("array exceeds maximum length ({0} items)")]
    ArrayTooLong(usize),
    #[error("object nesting exceeds maximum depth ({0})")]
    TooDeep(usize),
    #[error("invalid utf-8")]
    InvalidUtf8,
    #[error("contains a null byte or disallowed control character")]
    ControlCharacter,
    #[error("matches a blocked pattern: {0}")]
    BlockedPattern(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid package id: {0}")]
    InvalidPackageId(String),
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("invalid content identifier: {0}")]
    InvalidCid(String),
}

pub struct Validator {
    limits: Limits,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl Validator {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Validate a single string: length, UTF-8 (guaranteed by `&str`, but
    /// kept as an explicit step for symmetry with `validate_bytes`),
    /// control characters, and blocked patterns.
    pub fn validate_string(&self, s: &str) -> Result<(), ValidationError> {
        if s.chars().count() > self.limits.max_string_len {
            log_rejection("string_too_long", s);
            return Err(ValidationError::StringTooLong(self.limits.max_string_len));
        }
        if s.chars().any(|c| c == '\0' || (c.is_control() && !c.is_whitespace())) {
            log_rejection("control_character", s);
            return Err(ValidationError::ControlCharacter);
        }
        if let Some(pattern) = first_blocked_pattern(s) {
            log_rejection("blocked_pattern", s);
            return Err(ValidationError::BlockedPattern(pattern.to_string()));
        }
        Ok(())
    }

    /// Validate raw bytes as UTF-8 text before running string checks.
    pub fn validate_bytes(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        if bytes.len() > self.limits.max_json_bytes {
            log_rejection("too_large", "<bytes>");
            return Err(ValidationError::TooLarge(self.limits.max_json_bytes));
        }
        let s = std::str::from_utf8(bytes).map_err(|_| {
            log_rejection("invalid_utf8", "<bytes>");
            ValidationError::InvalidUtf8
        })?;
        self.validate_string(s)
    }

    /// Parse and validate a JSON document: size cap, then recursive
    /// length/depth/string checks on the parsed value.
    pub fn validate_json(&self, bytes: &[u8]) -> Result<Value, ValidationError> {
        if bytes.len() > self.limits.max_json_bytes {
            log_rejection("too_large", "<json>");
            return Err(ValidationError::TooLarge(self.limits.max_json_bytes));
        }
        let value: Value = serde_json::from_slice(bytes).map_err(|_| {
            log_rejection("invalid_utf8", "<json>");
            ValidationError::InvalidUtf8
        })?;
        self.validate_value(&value, 0)?;
        Ok(value)
    }

    fn validate_value(&self, value: &Value, depth: usize) -> Result<(), ValidationError> {
        if depth > self.limits.max_object_depth {
            return Err(ValidationError::TooDeep(self.limits.max_object_depth));
        }
        match value {
            Value::String(s) => self.validate_string(s)?,
            Value::Array(items) => {
                if items.len() > self.limits.max_array_len {
                    return Err(ValidationError::ArrayTooLong(self.limits.max_array_len));
                }
                for item in items {
                    self.validate_value(item, depth + 1)?;
                }
            }
            Value::Object(map) => {
                if map.len() > self.limits.max_array_len {
                    return Err(ValidationError::ArrayTooLong(self.limits.max_array_len));
                }
                for (k, v) in map {
                    self.validate_string(k)?;
                    self.validate_value(v, depth + 1)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Validate a URL: scheme restricted to `http`/`https`, hostname must
    /// not resolve to a loopback/private literal.
    pub fn validate_url(&self, url: &str) -> Result<(), ValidationError> {
        self.validate_string(url)?;
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ValidationError::InvalidUrl(url.to_string()))?;
        if scheme != "http" && scheme != "https" {
            log_rejection("bad_scheme", url);
            return Err(ValidationError::InvalidUrl(format!("disallowed scheme: {}", scheme)));
        }
        let host = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or("")
            .rsplit('@')
            .next()
            .unwrap_or("");
        let host = host.split(':').next().unwrap_or("");
        if host.is_empty() || is_private_or_loopback_host(host) {
            log_rejection("private_host", url);
            return Err(ValidationError::InvalidUrl(format!("disallowed host: {}", host)));
        }
        Ok(())
    }
}

fn is_private_or_loopback_host(host: &str) -> bool {
    let h = host.to_ascii_lowercase();
    if h == "localhost" || h.ends_with(".localhost") || h == "0.0.0.0" {
        return true;
    }
    if let Ok(ip) = h.parse::<std::net::IpAddr>() {
        return match ip {
            std::net::IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
            std::net::IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
        };
    }
    false
}

fn blocked_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)<script",
            r"(?i)javascript:",
            r"(?i)data:text/html",
            r"(?i)\bunion\s+select\b",
            r"(?i)\bdrop\s+table\b",
            r"\.\./",
            r"\.\.\\",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern compiles"))
        .collect()
    })
}

fn first_blocked_pattern(s: &str) -> Option<&'static str> {
    blocked_patterns()
        .iter()
        .find(|re| re.is_match(s))
        .map(|re| re.as_str())
}

/// Emit a redacted security event. The offending value is truncated and
/// has control characters stripped before logging, so secrets embedded in
/// rejected payloads never reach log storage verbatim.
fn log_rejection(reason: &str, offending: &str) {
    let redacted: String = offending.chars().filter(|c| !c.is_control()).take(80).collect();
    tracing::warn!(reason, value = %redacted, "rejected input validation");
}

/// Validate a `PackageId`-shaped string without constructing the type
/// (used by the HTTP server, which validates before it has parsed a
/// manifest at all).
pub fn validate_package_id_format(s: &str) -> Result<(), ValidationError> {
    if s.is_empty() || s.len() > 255 {
        return Err(ValidationError::InvalidPackageId(s.to_string()));
    }
    let first_ok = s.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_-./".contains(c));
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidPackageId(s.to_string()))
    }
}

/// Validate a semver 2.0.0 version string's surface shape.
pub fn validate_version_format(s: &str) -> Result<(), ValidationError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$",
        )
        .expect("static pattern compiles")
    });
    if re.is_match(s) {
        Ok(())
    } else {
        Err(ValidationError::InvalidVersion(s.to_string()))
    }
}

/// Validate a CID's surface shape (`oz1-` + 64 lowercase hex chars).
pub fn validate_cid_format(s: &str) -> Result<(), ValidationError> {
    let Some(digest) = s.strip_prefix(orizon_core::cid::CID_PREFIX) else {
        return Err(ValidationError::InvalidCid(s.to_string()));
    };
    if digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCid(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_null_bytes() {
        let v = Validator::default();
        assert!(v.validate_string("abc\0def").is_err());
    }

    #[test]
    fn rejects_script_injection() {
        let v = Validator::default();
        assert!(v.validate_string("<script>alert(1)</script>").is_err());
    }

    #[test]
    fn rejects_path_traversal() {
        let v = Validator::default();
        assert!(v.validate_string("../../etc/passwd").is_err());
    }

    #[test]
    fn allows_ordinary_whitespace() {
        let v = Validator::default();
        assert!(v.validate_string("line one\nline two\ttabbed").is_ok());
    }

    #[test]
    fn validates_json_depth() {
        let v = Validator::new(Limits {
            max_object_depth: 2,
            ..Limits::default()
        });
        let nested = serde_json::json!({"a": {"b": {"c": 1}}});
        let bytes = serde_json::to_vec(&nested).unwrap();
        assert!(v.validate_json(&bytes).is_err());
    }

    #[test]
    fn rejects_private_and_loopback_hosts() {
        let v = Validator::default();
        assert!(v.validate_url("http://localhost:8080/x").is_err());
        assert!(v.validate_url("http://127.0.0.1/x").is_err());
        assert!(v.validate_url("http://10.0.0.5/x").is_err());
        assert!(v.validate_url("https://registry.example.com/x").is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        let v = Validator::default();
        assert!(v.validate_url("ftp://example.com/x").is_err());
    }

    #[test]
    fn package_id_format() {
        assert!(validate_package_id_format("acme.http-utils").is_ok());
        assert!(validate_package_id_format("-leading-dash").is_err());
    }

    #[test]
    fn cid_format() {
        let cid = orizon_core::compute_cid(b"hi");
        assert!(validate_cid_format(cid.as_str()).is_ok());
        assert!(validate_cid_format("not-a-cid").is_err());
    }
}
