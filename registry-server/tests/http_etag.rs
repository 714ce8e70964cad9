//! Drives the router directly with `tower::ServiceExt::oneshot`, the way
//! the rest of the HTTP stack is already tested, to exercise a full
//! publish → list → conditional-refetch round trip without binding a
//! socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use orizon_core::{PackageBlob, PackageId, PackageManifest, Version};
use orizon_registry_server::state::{AppState, AuthMode, Config, CorsOrigins};
use orizon_registry_server::{build_router, open_backend};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        addr: "127.0.0.1:0".to_string(),
        token: None,
        auth_mode: AuthMode::Write,
        max_publish_bytes: 1024 * 1024,
        cors_origins: CorsOrigins::Any,
        access_log: false,
        rate_limit: None,
        tls_cert: None,
        tls_key: None,
    }
}

#[tokio::test]
async fn scenario_6_matching_if_none_match_returns_304_with_an_empty_body() {
    let registry = open_backend("memory");
    let config = test_config();
    let state = Arc::new(AppState::new(registry, &config));
    let app = build_router(state, &config);

    let manifest = PackageManifest::new(PackageId::new("left-pad").unwrap(), Version::from_str("1.0.0").unwrap());
    let blob = PackageBlob { manifest, data: b"payload".to_vec() };

    let publish = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&blob).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(publish.status(), StatusCode::OK);

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/list?name=left-pad")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let etag = first
        .headers()
        .get(axum::http::header::ETAG)
        .expect("list response carries an ETag")
        .to_str()
        .unwrap()
        .to_string();

    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/list?name=left-pad")
                .header("if-none-match", etag.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_MODIFIED);

    let body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn a_changed_listing_gets_a_different_etag() {
    let registry = open_backend("memory");
    let config = test_config();
    let state = Arc::new(AppState::new(registry, &config));
    let app = build_router(state, &config);

    let publish_one = |name: &'static str| {
        let manifest = PackageManifest::new(PackageId::new(name).unwrap(), Version::from_str("1.0.0").unwrap());
        PackageBlob { manifest, data: b"payload".to_vec() }
    };

    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&publish_one("widget")).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let before = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/list?name=widget")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let etag_before = before.headers().get(axum::http::header::ETAG).unwrap().to_str().unwrap().to_string();

    let manifest = PackageManifest::new(PackageId::new("widget").unwrap(), Version::from_str("2.0.0").unwrap());
    let blob = PackageBlob { manifest, data: b"payload v2".to_vec() };
    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/publish")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&blob).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let after = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/list?name=widget")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::OK);
    let etag_after = after.headers().get(axum::http::header::ETAG).unwrap().to_str().unwrap().to_string();
    assert_ne!(etag_before, etag_after);
}
