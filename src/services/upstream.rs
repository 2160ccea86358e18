//! Upstream server client
//!
//! Forwards requests to the backend API and relays its answer unchanged.
//! A single pooled `reqwest::Client` is shared by every request.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, Request, Response, StatusCode, Uri},
};
use http_body_util::LengthLimitError;
use reqwest::{redirect, Client};
use thiserror::Error;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::utils::error::GatewayError;

/// Why a request could not be relayed
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no upstream server configured")]
    NotConfigured,
    #[error("request body exceeds the route limit")]
    BodyTooLarge,
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProxyError {
    /// Local error to answer with; `limit` is the body ceiling of the route
    pub fn into_gateway_error(self, limit: usize) -> GatewayError {
        match self {
            ProxyError::NotConfigured => {
                GatewayError::UpstreamUnavailable("no upstream configured".to_string())
            }
            ProxyError::BodyTooLarge => GatewayError::PayloadTooLarge { limit },
            ProxyError::BodyRead(detail) => GatewayError::BadRequest(detail),
            ProxyError::Transport(e) => GatewayError::UpstreamUnavailable(e.to_string()),
        }
    }
}

/// Reverse proxy client for the upstream server
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: Client,
    base_url: Option<String>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            // Redirects belong to the caller, along with their Set-Cookie.
            .redirect(redirect::Policy::none())
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            base_url: config
                .url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// Outbound URL for an inbound request target: base + path [+ ?query]
    pub fn target_url(&self, uri: &Uri) -> Option<String> {
        let base = self.base_url.as_ref()?;
        let mut url = format!("{}{}", base, uri.path());
        if let Some(query) = uri.query() {
            url.push('?');
            url.push_str(query);
        }
        Some(url)
    }

    /// Relay a request to the upstream server.
    ///
    /// The inbound body is buffered under whatever limit the body limiter put
    /// on it. Status, headers and body of the upstream response are copied
    /// through untouched. No retries: a failed call is reported once.
    pub async fn forward(
        &self,
        request: Request<Body>,
        timeout: Duration,
    ) -> Result<Response<Body>, ProxyError> {
        let target = self
            .target_url(request.uri())
            .ok_or(ProxyError::NotConfigured)?;

        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| {
                if is_length_limit(&e) {
                    ProxyError::BodyTooLarge
                } else {
                    ProxyError::BodyRead(e.to_string())
                }
            })?;

        // Framing headers describe the inbound connection, not the re-sent body.
        let mut headers = parts.headers;
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        strip_hop_by_hop(&mut headers);

        debug!(method = %parts.method, target = %target, bytes = body.len(), "Forwarding upstream");

        let upstream = self
            .client
            .request(parts.method, target.as_str())
            .headers(headers)
            .body(body)
            .timeout(timeout)
            .send()
            .await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    /// Status the upstream answers a bodiless GET with
    pub async fn probe(&self, path: &str, timeout: Duration) -> Result<StatusCode, ProxyError> {
        let base = self.base_url.as_ref().ok_or(ProxyError::NotConfigured)?;
        let response = self
            .client
            .get(format!("{}{}", base, path))
            .timeout(timeout)
            .send()
            .await?;
        Ok(response.status())
    }
}

/// Headers that only describe a single connection (RFC 9110 §7.6.1)
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
