//! Liveness endpoint for hosting platforms that expect an open `PORT`.

use std::net::SocketAddr;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn router() -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
}

/// GET / and GET /health
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(port: u16, shutdown: CancellationToken) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Health server listening on http://{}", addr);

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
