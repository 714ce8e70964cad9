//! The request pipeline applied to every handler (spec §4.9): request-id
//! assignment, token-bucket rate limiting, constant-time bearer auth, and
//! security headers, wrapped around metrics recording. CORS, gzip
//! compression and the panic-recovery barrier are applied separately as
//! `tower-http` layers in `main.rs`.

use crate::error::AppError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::RngCore;
use std::sync::Arc;
use std::time::Instant;
use subtle::ConstantTimeEq;

const REQUEST_ID_HEADER: &str = "x-request-id";

fn generate_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn token_matches(configured: &str, presented: &str) -> bool {
    // Constant-time comparison regardless of length: pad both to the
    // longer length with zero bytes so no early return leaks length.
    let max_len = configured.len().max(presented.len());
    let mut a = vec![0u8; max_len];
    let mut b = vec![0u8; max_len];
    a[..configured.len()].copy_from_slice(configured.as_bytes());
    b[..presented.len()].copy_from_slice(presented.as_bytes());
    let len_equal = configured.len() == presented.len();
    bool::from(a.ct_eq(&b)) && len_equal
}

/// The combined pipeline: request-id, rate limiting, auth, then the
/// handler, then security headers and metrics recording on the way out.
pub async fn pipeline(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let handler_label = handler_label_for(&path);

    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    if handler_label != "metrics" {
        if let Some(bucket) = &state.rate_limiter {
            if !bucket.allow(1.0) {
                state.metrics.record_drop();
                let elapsed = start.elapsed().as_secs_f64();
                state.metrics.record(handler_label, StatusCode::TOO_MANY_REQUESTS.as_u16(), elapsed);
                let mut resp = (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response();
                resp.headers_mut().insert("retry-after", HeaderValue::from_static("1"));
                apply_common_headers(&mut resp, &request_id, state.tls_enabled);
                return resp;
            }
        }
    }

    if state.requires_auth(&path) {
        let presented = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        let authorized = match (presented, &state.token) {
            (Some(p), Some(expected)) => token_matches(expected, p),
            _ => false,
        };
        if !authorized {
            let elapsed = start.elapsed().as_secs_f64();
            state.metrics.record(handler_label, StatusCode::UNAUTHORIZED.as_u16(), elapsed);
            let err: AppError = orizon_registry::RegistryError::Unauthorized.into();
            let mut resp = err.into_response();
            if state.auth_mode == crate::state::AuthMode::ReadWrite {
                resp.headers_mut().insert("vary", HeaderValue::from_static("Authorization"));
            }
            apply_common_headers(&mut resp, &request_id, state.tls_enabled);
            return resp;
        }
    }

    let _in_flight = state.metrics.enter();
    let mut response = next.run(req).await;

    apply_common_headers(&mut response, &request_id, state.tls_enabled);
    if state.auth_mode == crate::state::AuthMode::ReadWrite && handler_label != "publish" && handler_label != "healthz"
    {
        response.headers_mut().insert("vary", HeaderValue::from_static("Authorization"));
    }

    let elapsed = start.elapsed().as_secs_f64();
    state.metrics.record(handler_label, response.status().as_u16(), elapsed);
    if state.access_log {
        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration_ms = elapsed * 1000.0,
            request_id = %request_id,
            "request"
        );
    }
    response
}

fn apply_common_headers(resp: &mut Response, request_id: &str, tls_enabled: bool) {
    let headers = resp.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    if tls_enabled {
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        );
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert("x-request-id", value);
    }
}

/// Derives the metrics/auth label for a path. `/fetch`, `/find`, `/list`
/// and `/all` ignore their query strings (already stripped by `uri().path()`).
fn handler_label_for(path: &str) -> &'static str {
    match path {
        "/publish" => "publish",
        "/fetch" => "fetch",
        "/find" => "find",
        "/list" => "list",
        "/all" => "all",
        "/healthz" => "healthz",
        "/metrics" => "metrics",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_rejects_mismatch() {
        assert!(token_matches("secret-token", "secret-token"));
        assert!(!token_matches("secret-token", "wrong-token"));
        assert!(!token_matches("secret-token", "secret-tok"));
    }
}
