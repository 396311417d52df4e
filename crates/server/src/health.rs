//! Health HTTP surface.
//!
//! Thin liveness/readiness endpoints beside the gRPC listener:
//! - `GET /healthz` — process is up;
//! - `GET /readyz` — a trivial store query succeeds.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use nodewatch_store::{KvBackend, NodeStore};
use serde_json::json;
use tracing::info;

/// Builds the health router over a shared store handle.
pub fn router<B>(store: NodeStore<B>) -> Router
where
    B: KvBackend + Clone,
{
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<B>))
        .with_state(store)
}

/// Binds and serves the health router until the process exits.
///
/// # Errors
///
/// Returns the bind or serve error.
pub async fn serve<B>(store: NodeStore<B>, addr: SocketAddr) -> std::io::Result<()>
where
    B: KvBackend + Clone,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "health server listening");
    axum::serve(listener, router(store)).await
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn readyz<B>(State(store): State<NodeStore<B>>) -> impl IntoResponse
where
    B: KvBackend + Clone,
{
    match store.list(None, None, 0, 1).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "error": err.to_string() })),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use nodewatch_store::MemoryBackend;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn healthz_reports_healthy() {
        let app = router(NodeStore::new(MemoryBackend::new()));
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_reports_ready_when_the_store_answers() {
        let app = router(NodeStore::new(MemoryBackend::new()));
        let response = app
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
