//! Health check endpoint.

use axum::{response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Always "ok" while the process is serving.
    pub status: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,
}

/// Create health check routes.
pub fn routes() -> Router {
    Router::new().route("/health", get(health))
}

/// Liveness check. Reports only that the process is up; it does not reflect
/// whether the instance has converged.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
