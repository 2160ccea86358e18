//! Structured request logging middleware
//!
//! The response body is wrapped so the record carries the bytes actually
//! sent. The record is queued on the access log once the body has been
//! fully written, or when it is dropped because the client went away.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use http_body::{Frame, SizeHint};

use crate::middleware::correlation::CorrelationId;
use crate::services::access_log::{AccessLog, AccessRecord};

/// Middleware that records one access log entry per request
pub async fn request_log_middleware(
    State(log): State<AccessLog>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let pending = PendingRecord {
        log,
        correlation_id,
        method,
        path,
        status: response.status().as_u16(),
        remote_addr,
        started,
    };

    let (parts, body) = response.into_parts();
    Response::from_parts(
        parts,
        Body::new(CountingBody {
            inner: body,
            bytes: 0,
            pending: Some(pending),
        }),
    )
}

struct PendingRecord {
    log: AccessLog,
    correlation_id: String,
    method: String,
    path: String,
    status: u16,
    remote_addr: Option<SocketAddr>,
    started: Instant,
}

/// Response body that counts the bytes it yields
struct CountingBody {
    inner: Body,
    bytes: u64,
    pending: Option<PendingRecord>,
}

impl CountingBody {
    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.log.record(AccessRecord {
                correlation_id: pending.correlation_id,
                method: pending.method,
                path: pending.path,
                status: pending.status,
                elapsed_ms: pending.started.elapsed().as_millis() as u64,
                bytes: self.bytes,
                remote_addr: pending.remote_addr,
            });
        }
    }
}

impl http_body::Body for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
            }
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => this.finish(),
            Poll::Pending => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CountingBody {
    fn drop(&mut self) {
        self.finish();
    }
}
