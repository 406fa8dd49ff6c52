use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub fn router() -> Router {
    Router::new()
        .route("/", get(ok))
        .route("/health", get(ok))
}

async fn ok() -> &'static str {
    "ok"
}

pub async fn serve(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind health endpoint on {addr}"))?;
    serve_on(listener).await
}

pub async fn serve_on(listener: TcpListener) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "health endpoint listening");
    }
    axum::serve(listener, router())
        .await
        .context("health server failed")
}
