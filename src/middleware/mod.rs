//! Middleware components
//!
//! This module contains middleware for:
//! - Correlation ids
//! - Request logging
//! - Security headers and CORS
//! - CSRF protection
//! - Request body limits
//! - Panic recovery
//!
//! The chain order is the `PIPELINE` table below, outermost first.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};

use crate::AppState;

pub mod auth;
pub mod body_limit;
pub mod correlation;
pub mod cors;
pub mod csrf;
pub mod recovery;
pub mod request_log;
pub mod security_headers;

pub use auth::{MaybeSession, SessionUser};
pub use correlation::CorrelationId;
pub use csrf::CsrfGuard;

/// One step of the request pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Correlation,
    RequestLog,
    SecurityHeaders,
    Cors,
    Csrf,
    BodyLimit,
    /// Contains panics from handlers only; the stages above it are not covered.
    Recovery,
}

/// Middleware chain, outermost to innermost.
///
/// Recovery wraps only the handlers: the 500 it produces for a panic passes
/// back out through the header stages and the logger like any response.
pub const PIPELINE: [Stage; 7] = [
    Stage::Correlation,
    Stage::RequestLog,
    Stage::SecurityHeaders,
    Stage::Cors,
    Stage::Csrf,
    Stage::BodyLimit,
    Stage::Recovery,
];

impl Stage {
    fn apply(self, router: Router, state: &AppState) -> Router {
        match self {
            Stage::Correlation => router.layer(from_fn(correlation::correlation_middleware)),
            Stage::RequestLog => router.layer(from_fn_with_state(
                state.access_log.clone(),
                request_log::request_log_middleware,
            )),
            Stage::SecurityHeaders => {
                router.layer(from_fn(security_headers::security_headers_middleware))
            }
            Stage::Cors => router.layer(from_fn(cors::cors_middleware)),
            Stage::Csrf => router.layer(from_fn_with_state(
                state.csrf.clone(),
                csrf::csrf_middleware,
            )),
            Stage::BodyLimit => router.layer(from_fn_with_state(
                state.routes.clone(),
                body_limit::body_limit_middleware,
            )),
            Stage::Recovery => router.layer(from_fn(recovery::recovery_middleware)),
        }
    }
}

/// Wrap `router` in the full pipeline. Layers added later wrap earlier ones,
/// so the table is applied innermost first.
pub fn apply_pipeline(router: Router, state: &AppState) -> Router {
    PIPELINE
        .iter()
        .rev()
        .fold(router, |router, stage| stage.apply(router, state))
}
