//! Request body size limiter
//!
//! Wraps the request body so reading past the route's ceiling fails with
//! `LengthLimitError`. Extractors and the forwarder turn that into a 413.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http_body_util::Limited;

use crate::routing::RoutePolicy;

pub async fn body_limit_middleware(
    State(routes): State<Arc<RoutePolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let limit = routes.body_limit(request.uri().path());
    let request = request.map(|body| Body::new(Limited::new(body, limit)));
    next.run(request).await
}
