//! Read-only HTTP view of a running deployment.

use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tb_deploy::Progress;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

pub fn router(progress: watch::Receiver<Progress>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/healthz", get(healthz))
        .with_state(progress)
        .layer(TraceLayer::new_for_http())
}

async fn status(State(progress): State<watch::Receiver<Progress>>) -> Json<Progress> {
    Json(progress.borrow().clone())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Bind `addr` and serve in the background for the rest of the process.
pub async fn spawn(addr: SocketAddr, progress: watch::Receiver<Progress>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "status server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(progress)).await {
            tracing::error!(error = %e, "status server stopped");
        }
    });
    Ok(())
}
