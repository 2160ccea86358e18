//! Reverse proxy handlers
//!
//! Every path without a local handler is relayed to the upstream server, as
//! is the protocol endpoint (with its longer timeout).

use std::time::Duration;

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{
    middleware::CorrelationId, routing::RouteClass, utils::error::GatewayError, AppState,
};

/// Fallback handler: relay to the upstream server
pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    let timeout = match state.routes.classify(request.uri().path()) {
        RouteClass::Protocol => state.config.upstream.protocol_timeout_secs,
        RouteClass::MachineApi | RouteClass::Browser => state.config.upstream.timeout_secs,
    };
    relay(&state, request, Duration::from_secs(timeout)).await
}

/// Protocol endpoint handler
pub async fn protocol(State(state): State<AppState>, request: Request) -> Response {
    let timeout = Duration::from_secs(state.config.upstream.protocol_timeout_secs);
    relay(&state, request, timeout).await
}

async fn relay(state: &AppState, request: Request, timeout: Duration) -> Response {
    let path = request.uri().path().to_string();
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    match state.upstream.forward(request, timeout).await {
        Ok(response) => response,
        Err(err) => {
            let error = err.into_gateway_error(state.routes.body_limit(&path));
            if let GatewayError::UpstreamUnavailable(ref detail) = error {
                warn!(
                    correlation_id = %correlation_id,
                    path = %path,
                    error = %detail,
                    "Upstream request failed"
                );
            }
            error.into_response()
        }
    }
}
