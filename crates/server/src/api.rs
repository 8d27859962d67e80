//! HTTP API for cluster utilization, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_lib::{FallbackOrchestrator, MetricsOutcome, Resource};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub orchestrator: FallbackOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: FallbackOrchestrator) -> Self {
        Self { orchestrator }
    }
}

/// RFC 7807 body for failed requests
#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match serde_json::to_vec(&self) {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, "application/problem+json")],
                body,
            )
                .into_response(),
            Err(_) => status.into_response(),
        }
    }
}

async fn reading_response(state: &AppState, resource: Resource) -> Response {
    match state.orchestrator.resolve(resource).await {
        MetricsOutcome::Found(reading) => (StatusCode::OK, Json(reading)).into_response(),
        MetricsOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            resource.not_found_message(),
        )
            .into_response(),
        MetricsOutcome::Failed { source, error } => {
            error!(resource = %resource, source = %source, error = %error, "Metric source failed");
            ProblemDetails {
                kind: "https://tools.ietf.org/html/rfc9110#section-15.6.1",
                title: "An error occurred while processing your request.",
                status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                detail: error.to_string(),
            }
            .into_response()
        }
    }
}

/// Cluster CPU utilization
async fn cluster_cpu(State(state): State<Arc<AppState>>) -> Response {
    reading_response(&state, Resource::Cpu).await
}

/// Cluster memory utilization
async fn cluster_memory(State(state): State<Arc<AppState>>) -> Response {
    reading_response(&state, Resource::Memory).await
}

/// Liveness check
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/cluster/cpu", get(cluster_cpu))
        .route("/cluster/memory", get(cluster_memory))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
