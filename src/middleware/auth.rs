//! Session authentication extractors
//!
//! Authentication is not a blanket gate: handlers that need a caller opt in
//! by taking `SessionUser` (rejects with 401) or `MaybeSession` (never
//! rejects) as a parameter. Both read the session cookie.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;

use crate::{
    services::session::{SessionClaims, SessionError},
    utils::error::ErrorResponse,
    AppState,
};

/// Authenticated caller, from a valid session cookie
#[derive(Debug, Clone)]
pub struct SessionUser(pub SessionClaims);

/// Caller identity if a valid session cookie was sent
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<SessionClaims>);

fn session_from_parts(parts: &Parts, state: &AppState) -> Result<SessionClaims, SessionError> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar
        .get(&state.config.session.cookie_name)
        .map(|c| c.value())
        .unwrap_or_default();
    state.sessions.validate(token)
}

fn rejection_code(err: &SessionError) -> &'static str {
    match err {
        SessionError::Missing => "session_missing",
        SessionError::Expired => "session_expired",
        SessionError::Malformed
        | SessionError::UnsupportedAlgorithm(_)
        | SessionError::UnsignedToken
        | SessionError::BadSignature => "session_invalid",
    }
}

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        session_from_parts(parts, state)
            .map(SessionUser)
            .map_err(|err| {
                debug!(error = %err, path = %parts.uri.path(), "Session rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(
                        ErrorResponse::new("unauthorized", "Authentication required")
                            .with_code(rejection_code(&err)),
                    ),
                )
            })
    }
}

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(session_from_parts(parts, state).ok()))
    }
}

/// Session cookie carrying `token` (HttpOnly, SameSite=Lax)
pub fn session_cookie(name: &str, token: &str, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Removal cookie for the session
pub fn clear_session_cookie(name: &str, secure: bool) -> Cookie<'static> {
    let mut cookie = session_cookie(name, "", secure);
    cookie.make_removal();
    cookie
}
