//! Routes and handlers
//!
//! Local routes are an explicit per-method table; any method a local path
//! does not list is answered with 405. Every other path is relayed upstream.

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::services::ServeDir;

use crate::{middleware::apply_pipeline, utils::error::GatewayError, AppState};

mod health;
mod proxy;
mod session;

pub use health::HealthResponse;
pub use session::{LogoutResponse, SessionInfo};

/// Paths served locally; the protocol path is added from configuration.
pub const LOCAL_ROUTES: [&str; 5] = [
    "/health",
    "/health/live",
    "/health/ready",
    "/auth/session",
    "/auth/logout",
];

async fn method_not_allowed(method: Method) -> GatewayError {
    GatewayError::MethodNotAllowed(method.to_string())
}

fn local(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(method_not_allowed)
}

/// Build the application router with the full middleware pipeline
pub fn create_router(state: AppState) -> Router {
    let protocol_path = state.routes.protocol_path().to_string();

    let mut router = Router::new()
        .route("/health", local(get(health::health_check)))
        .route("/health/live", local(get(health::liveness)))
        .route("/health/ready", local(get(health::readiness)))
        .route("/auth/session", local(get(session::current_session)))
        .route("/auth/logout", local(post(session::logout)))
        .route(
            &protocol_path,
            local(
                get(proxy::protocol)
                    .post(proxy::protocol)
                    .delete(proxy::protocol),
            ),
        )
        .fallback(proxy::forward);

    if let Some(ref static_dir) = state.config.server.static_dir {
        router = router.nest_service("/static", ServeDir::new(static_dir));
    }

    // The body limiter is the only bound on request bodies.
    let router = router
        .layer(DefaultBodyLimit::disable())
        .with_state(state.clone());

    apply_pipeline(router, &state)
}
