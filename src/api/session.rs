//! Session endpoints
//!
//! `GET /auth/session` reports who the session cookie belongs to and
//! `POST /auth/logout` clears it. Login itself happens on the upstream
//! server, which issues the cookie.

use axum::{extract::State, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::{
    middleware::{auth::clear_session_cookie, MaybeSession, SessionUser},
    AppState,
};

/// Identity carried by a valid session
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub logged_out: bool,
}

/// Current session identity, or 401
pub async fn current_session(SessionUser(claims): SessionUser) -> Json<SessionInfo> {
    let expires_at = claims.expires_at();
    Json(SessionInfo {
        subject: claims.sub,
        email: claims.email,
        name: claims.name,
        provider: claims.provider,
        expires_at,
    })
}

/// Clear the session cookie. Succeeds whether or not a session existed.
pub async fn logout(
    State(state): State<AppState>,
    MaybeSession(claims): MaybeSession,
    jar: CookieJar,
) -> (CookieJar, Json<LogoutResponse>) {
    if let Some(claims) = claims {
        info!(subject = %claims.sub, "Session logged out");
    }

    let jar = jar.add(clear_session_cookie(
        &state.config.session.cookie_name,
        state.config.server.secure_cookies,
    ));
    (jar, Json(LogoutResponse { logged_out: true }))
}
