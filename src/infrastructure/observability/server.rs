//! Pull-based exposition of the metric registry.
//!
//! Serves `GET /metrics` in Prometheus text format and `GET /health`.
//! Only reads the registry; never blocks the poller beyond one render.

use crate::infrastructure::observability::metrics::MetricRegistry;
use axum::{Router, extract::State, http::header, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router(registry: Arc<MetricRegistry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(registry)
}

/// Bind the exposition listener. Fails fast if the port is taken.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics endpoint listening on http://{}/metrics", listener.local_addr()?);
    Ok(listener)
}

/// Serve until the shutdown flag flips to `true`.
pub async fn serve(
    listener: TcpListener,
    registry: Arc<MetricRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("Metrics endpoint shutting down");
        })
        .await
}

async fn metrics_handler(State(registry): State<Arc<MetricRegistry>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], registry.render())
}

async fn health_handler() -> &'static str {
    "ok"
}
