//! Health check endpoints
//!
//! Provides health check endpoints for monitoring and load balancers.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::debug;

use crate::AppState;

/// Upper bound on the readiness probe, whatever the API timeout
const READINESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Simple health check endpoint (for load balancers)
///
/// Returns 200 OK if the service is running.
/// Does not check the upstream server.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Liveness probe (for Kubernetes)
///
/// Returns 200 OK if the process is alive.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (for Kubernetes)
///
/// Returns 200 OK when an upstream is configured and answers its `/health`
/// with anything but a server error.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    let timeout = READINESS_TIMEOUT.min(Duration::from_secs(state.config.upstream.timeout_secs));
    match state.upstream.probe("/health", timeout).await {
        Ok(status) if !status.is_server_error() => StatusCode::OK,
        Ok(status) => {
            debug!(%status, "Upstream not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
        Err(e) => {
            debug!(error = %e, "Upstream not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
