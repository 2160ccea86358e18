//! Correlation id middleware
//!
//! Tags every request with an opaque id taken from `X-Request-ID` or
//! `X-Correlation-ID`, or freshly generated. The id is stored in the request
//! extensions for the rest of the chain and echoed in `X-Correlation-ID`.

use std::fmt;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Correlation id of the request being processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware that assigns the correlation id
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let inbound = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .or_else(|| request.headers().get(&CORRELATION_ID_HEADER))
        .filter(|value| !value.is_empty())
        .cloned();

    // The inbound value is opaque: it is echoed byte-for-byte, and logged lossily.
    let (id, header) = match inbound {
        Some(value) => (String::from_utf8_lossy(value.as_bytes()).into_owned(), Some(value)),
        None => {
            let id = Uuid::new_v4().to_string();
            let header = HeaderValue::from_str(&id).ok();
            (id, header)
        }
    };

    request.extensions_mut().insert(CorrelationId(id));

    let mut response = next.run(request).await;
    if let Some(header) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, header);
    }
    response
}
