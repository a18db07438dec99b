//! HTTP front end for the ingestion and query pipelines

pub mod errors;
pub mod handlers;

#[cfg(test)]
mod tests;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::Result;
use crate::pipeline::RagService;

pub use errors::ApiError;
pub use handlers::{QueryRequest, UPLOAD_FIELD};

/// Build the application router around a shared service.
///
/// Both `/upload/` and `/upload` style paths are routed.
#[inline]
pub fn router(service: Arc<RagService>) -> Router {
    let body_limit = service.config().server.max_upload_bytes;

    Router::new()
        .route("/upload/", post(handlers::upload))
        .route("/upload", post(handlers::upload))
        .route("/query/", post(handlers::query))
        .route("/query", post(handlers::query))
        .route("/status/", get(handlers::status))
        .route("/status", get(handlers::status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Bind `address` and serve until Ctrl-C
#[inline]
pub async fn serve(service: Arc<RagService>, address: &str) -> Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
