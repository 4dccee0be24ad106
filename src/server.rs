//! Prometheus exposition endpoint.
//!
//! Serves `GET /metrics` in the text exposition format. Unauthenticated:
//! only operational series with bounded label cardinality are exposed.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::info;

pub async fn serve(addr: SocketAddr, registry: Registry) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "metrics endpoint listening");
    axum::serve(listener, app)
        .await
        .context("metrics server terminated")
}

async fn render_metrics(State(registry): State<Registry>) -> impl IntoResponse {
    let mut buffer = Vec::new();
    if let Err(err) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], buffer).into_response()
}
