//! volcast HTTP service: configuration, routes, on-chain submission.
//!
//! Endpoints:
//! - `GET /hello`
//! - `POST /fit`, `POST /predict`
//! - `POST /submit-onchain`, `POST /latest-forecast-id`
//!
//! Business failures answer 200 with `success: false`; unparsable bodies answer 422.

pub mod config;
pub mod error;
pub mod onchain;
pub mod routes;
pub mod service;
pub mod state;

use axum::http::{HeaderValue, Method};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub use config::{ConfigError, ServiceConfig};
pub use error::{ErrorKind, ServiceError};
pub use state::AppState;

/// Router with CORS for the configured front-end origins.
pub fn app(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .merge(routes::api_router())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
pub async fn serve(state: Arc<AppState>) -> std::io::Result<()> {
    let addr: SocketAddr = state
        .config
        .socket_addr()
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let app = app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("volcast listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, stopping");
}
