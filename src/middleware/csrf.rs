//! CSRF protection (double-submit cookie)
//!
//! Safe requests pass; a `GET` without a token cookie gets a fresh one that
//! client script can read and echo back in the CSRF header. Unsafe requests
//! to non-exempt paths must carry the cookie and the header, and the two
//! values must be byte-equal.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::{rngs::OsRng, RngCore};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::CsrfConfig;
use crate::routing::RoutePolicy;
use crate::utils::error::GatewayError;

/// Number of random bytes in a token (hex-encoded to twice as many chars)
pub const TOKEN_BYTES: usize = 32;

/// CSRF guard configuration shared by every request
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    routes: Arc<RoutePolicy>,
    cookie_name: String,
    header_name: HeaderName,
    secure: bool,
}

impl CsrfGuard {
    pub fn new(routes: Arc<RoutePolicy>, config: &CsrfConfig, secure: bool) -> Result<Self> {
        let header_name = HeaderName::from_bytes(config.header_name.as_bytes())
            .with_context(|| format!("Invalid CSRF header name: {}", config.header_name))?;

        Ok(Self {
            routes,
            cookie_name: config.cookie_name.clone(),
            header_name,
            secure,
        })
    }

    fn token_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token))
            .http_only(false)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .path("/")
            .build()
    }

    /// Double-submit check for an unsafe request
    fn check(&self, jar: &CookieJar, headers: &HeaderMap) -> Result<(), &'static str> {
        let cookie = jar
            .get(&self.cookie_name)
            .map(|c| c.value())
            .filter(|v| !v.is_empty())
            .ok_or("CSRF cookie missing")?;
        let header = headers
            .get(&self.header_name)
            .map(|v| v.as_bytes())
            .filter(|v| !v.is_empty())
            .ok_or("CSRF header missing")?;

        if !bool::from(cookie.as_bytes().ct_eq(header)) {
            return Err("CSRF token mismatch");
        }
        Ok(())
    }
}

/// Generate a new random token
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

pub async fn csrf_middleware(
    State(guard): State<CsrfGuard>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    // Exempt paths never see a token, in either direction.
    if guard.routes.is_csrf_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    if is_safe(request.method()) {
        let needs_token = request.method() == Method::GET
            && jar
                .get(&guard.cookie_name)
                .map_or(true, |c| c.value().is_empty());

        let response = next.run(request).await;
        if needs_token {
            let jar = jar.add(guard.token_cookie(generate_token()));
            return (jar, response).into_response();
        }
        return response;
    }

    match guard.check(&jar, request.headers()) {
        Ok(()) => next.run(request).await,
        Err(reason) => {
            debug!(
                method = %request.method(),
                path = %request.uri().path(),
                reason,
                "CSRF check failed"
            );
            GatewayError::Forbidden(reason.to_string()).into_response()
        }
    }
}
