//! HTTP endpoint serving the stored content.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::content::ContentStore;
use crate::error::{io_err, ServerError};

/// Prometheus text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Clone)]
struct AppState {
    content: ContentStore,
    started_at_unix: u64,
}

pub fn router(content: ContentStore, started_at_unix: u64) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(AppState {
            content,
            started_at_unix,
        })
}

/// Serve `router` on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = listener
        .local_addr()
        .map_err(|e| io_err("http listener", e))?;
    tracing::info!(addr = %addr, "serving http");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| io_err(addr.to_string(), e))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        state.content.bytes().await,
    )
}

async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    let content = state.content.status().await;
    Json(json!({
        "running": true,
        "started_at_unix": state.started_at_unix,
        "path": content.path,
        "bytes": content.bytes,
        "reloads": content.reloads,
        "loaded_at_unix": content.loaded_at_unix,
    }))
}
