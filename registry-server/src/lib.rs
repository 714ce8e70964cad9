//! Orizon registry server library: the axum router, request pipeline and
//! backend wiring, factored out of `main.rs` so integration tests can
//! drive the whole stack with `tower::ServiceExt::oneshot` instead of
//! binding a real socket.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod ratelimit;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use orizon_registry::{FileRegistry, MemoryRegistry, RegistryStore};
use state::{AppState, Config, CorsOrigins};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_BACKEND_PATH: &str = ".orizon/registry";

pub fn open_backend(spec: &str) -> Arc<dyn RegistryStore> {
    if spec == "memory" {
        Arc::new(MemoryRegistry::new())
    } else {
        Arc::new(FileRegistry::open(spec).expect("failed to open file registry backend"))
    }
}

pub fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::any(),
        CorsOrigins::List(list) => {
            let values: Vec<HeaderValue> = list.iter().filter_map(|s| HeaderValue::from_str(s).ok()).collect();
            AllowOrigin::list(values)
        }
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::IF_NONE_MATCH])
        .expose_headers([header::ETAG, header::HeaderName::from_static("x-request-id")])
}

pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    let publish_router = Router::new()
        .route("/publish", post(handlers::publish))
        .route_layer(DefaultBodyLimit::max(state.max_publish_bytes));

    Router::new()
        .merge(publish_router)
        .route("/fetch", get(handlers::fetch))
        .route("/find", get(handlers::find))
        .route("/list", get(handlers::list))
        .route("/all", get(handlers::all))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .layer(axum::middleware::from_fn_with_state(state.clone(), middleware::pipeline))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
