//! Orizon registry server: exposes `orizon-registry`'s store operations
//! over HTTP (spec component C9), with the request pipeline, rate
//! limiting and metrics described in spec §4.9/§4.10.

use axum_server::tls_rustls::RustlsConfig;
use orizon_registry_server::state::{AppState, Config};
use orizon_registry_server::{build_router, open_backend, DEFAULT_BACKEND_PATH};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "orizon_registry_server=info,tower_http=info".to_string()),
        )
        .init();

    let config = Config::from_env();
    let backend_spec = std::env::var("ORIZON_REGISTRY").unwrap_or_else(|_| DEFAULT_BACKEND_PATH.to_string());
    let registry = open_backend(&backend_spec);
    let state = Arc::new(AppState::new(registry, &config));

    let addr: std::net::SocketAddr = config.addr.parse()?;
    let app = build_router(state.clone(), &config);

    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, draining in-flight requests (up to 5s)");
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
    });

    if let (Some(cert), Some(key)) = (&config.tls_cert, &config.tls_key) {
        info!(%addr, "registry server listening (tls)");
        let tls_config = RustlsConfig::from_pem_file(cert, key).await?;
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!(%addr, "registry server listening");
        axum_server::bind(addr).handle(handle).serve(app.into_make_service()).await?;
    }

    Ok(())
}
