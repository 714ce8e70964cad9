//! Handlers for the wire protocol in spec §6. Request/response JSON
//! shapes match [`orizon_core::PackageBlob`]/[`orizon_core::PackageManifest`]
//! directly wherever possible, since `orizon_registry::HttpRegistry`
//! (the client side of this same wire contract) serializes against those
//! types verbatim.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use orizon_core::{Cid, Constraint, PackageBlob, PackageId, PackageManifest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
pub struct HealthBody {
    ok: bool,
}

pub async fn healthz() -> impl IntoResponse {
    let mut resp = Json(HealthBody { ok: true }).into_response();
    resp.headers_mut().insert("cache-control", HeaderValue::from_static("no-store"));
    resp
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Serialize)]
struct PublishResponseBody {
    cid: String,
}

pub async fn publish(
    State(state): State<Arc<AppState>>,
    Json(blob): Json<PackageBlob>,
) -> Result<Response, AppError> {
    state.validator.validate_string(blob.manifest.name.as_str())?;
    let cancel = CancellationToken::new();
    let cid = state.registry.publish(blob, &cancel).await?;
    let mut resp = (
        StatusCode::OK,
        Json(PublishResponseBody { cid: cid.to_string() }),
    )
        .into_response();
    resp.headers_mut().insert("cache-control", HeaderValue::from_static("no-store"));
    Ok(resp)
}

#[derive(Deserialize)]
pub struct FetchQuery {
    cid: String,
}

pub async fn fetch(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FetchQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    orizon_validate::validate_cid_format(&q.cid)?;
    let cid = Cid::from_str(&q.cid).map_err(|e| {
        AppError::new(StatusCode::BAD_REQUEST, "InvalidCID", e.to_string())
    })?;
    let cancel = CancellationToken::new();
    let blob = state.registry.fetch(&cid, &cancel).await?;
    let body = serde_json::to_vec(&blob).map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "IOFailure", e.to_string()))?;
    Ok(etag_response(&body, &headers, "application/json"))
}

#[derive(Deserialize)]
pub struct FindQuery {
    name: String,
    constraint: Option<String>,
}

#[derive(Serialize)]
struct FindResponseBody {
    cid: String,
    manifest: PackageManifest,
}

pub async fn find(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FindQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    orizon_validate::validate_package_id_format(&q.name)?;
    let name = PackageId::new(q.name.as_str()).map_err(|e| AppError::new(StatusCode::BAD_REQUEST, "InvalidPackageID", e.to_string()))?;
    let constraint = match q.constraint.as_deref() {
        Some("") | None => None,
        Some(text) => Some(
            Constraint::parse(text)
                .map_err(|e| AppError::new(StatusCode::BAD_REQUEST, "InvalidConstraint", e.to_string()))?,
        ),
    };
    let cancel = CancellationToken::new();
    let (cid, manifest) = state.registry.find(&name, constraint.as_ref(), &cancel).await?;
    let body_value = FindResponseBody {
        cid: cid.to_string(),
        manifest,
    };
    let body = serde_json::to_vec(&body_value).map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "IOFailure", e.to_string()))?;
    Ok(etag_response(&body, &headers, "application/json"))
}

#[derive(Deserialize)]
pub struct ListQuery {
    name: String,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    orizon_validate::validate_package_id_format(&q.name)?;
    let name = PackageId::new(q.name.as_str()).map_err(|e| AppError::new(StatusCode::BAD_REQUEST, "InvalidPackageID", e.to_string()))?;
    let cancel = CancellationToken::new();
    let manifests = state.registry.list(&name, &cancel).await?;
    let body = serde_json::to_vec(&manifests).map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "IOFailure", e.to_string()))?;
    Ok(etag_response(&body, &headers, "application/json"))
}

pub async fn all(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AppError> {
    let cancel = CancellationToken::new();
    let manifests = state.registry.all(&cancel).await?;
    let body = serde_json::to_vec(&manifests).map_err(|e| AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "IOFailure", e.to_string()))?;
    Ok(etag_response(&body, &headers, "application/json"))
}

/// Builds a `200`/`304` response from `body`, computing a weak ETag over
/// the uncompressed bytes (spec §4.9: stable across gzip) and honoring
/// `If-None-Match`.
fn etag_response(body: &[u8], headers: &HeaderMap, content_type: &'static str) -> Response {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let etag = format!("W/\"{}\"", hex::encode(hasher.finalize()));

    if let Some(candidate) = headers.get(axum::http::header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if candidate == etag {
            let mut resp = StatusCode::NOT_MODIFIED.into_response();
            resp.headers_mut().insert(axum::http::header::ETAG, HeaderValue::from_str(&etag).unwrap());
            resp.headers_mut().insert("cache-control", HeaderValue::from_static("no-cache"));
            return resp;
        }
    }

    let mut resp = (StatusCode::OK, [("content-type", content_type)], body.to_vec()).into_response();
    resp.headers_mut().insert(axum::http::header::ETAG, HeaderValue::from_str(&etag).unwrap());
    resp.headers_mut().insert("cache-control", HeaderValue::from_static("no-cache"));
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_weak_and_stable_for_same_bytes() {
        let headers = HeaderMap::new();
        let a = etag_response(b"hello", &headers, "application/json");
        let b = etag_response(b"hello", &headers, "application/json");
        assert_eq!(
            a.headers().get(axum::http::header::ETAG),
            b.headers().get(axum::http::header::ETAG)
        );
        let tag = a.headers().get(axum::http::header::ETAG).unwrap().to_str().unwrap();
        assert!(tag.starts_with("W/\""));
        assert_eq!(a.status(), StatusCode::OK);
    }

    #[test]
    fn matching_if_none_match_returns_304_with_empty_body() {
        let fresh = etag_response(b"hello", &HeaderMap::new(), "application/json");
        let tag = fresh.headers().get(axum::http::header::ETAG).unwrap().to_str().unwrap().to_string();

        let mut conditional = HeaderMap::new();
        conditional.insert(axum::http::header::IF_NONE_MATCH, HeaderValue::from_str(&tag).unwrap());
        let resp = etag_response(b"hello", &conditional, "application/json");
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    }

    #[test]
    fn different_bytes_produce_different_etags() {
        let a = etag_response(b"hello", &HeaderMap::new(), "application/json");
        let b = etag_response(b"world", &HeaderMap::new(), "application/json");
        assert_ne!(
            a.headers().get(axum::http::header::ETAG),
            b.headers().get(axum::http::header::ETAG)
        );
    }
}
