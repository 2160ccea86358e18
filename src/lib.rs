//! Portal Gatekeeper Library
//!
//! Request gatekeeper for a web portal: a fixed middleware pipeline
//! (correlation, logging, security headers, CORS, CSRF, body limits, panic
//! recovery), session token validation, and a transparent reverse proxy to
//! the upstream API server.

use std::sync::Arc;

use anyhow::Result;

pub mod api;
pub mod config;
pub mod middleware;
pub mod routing;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use middleware::{MaybeSession, SessionUser};
use middleware::CsrfGuard;
use routing::RoutePolicy;
use services::{access_log::AccessLog, session::SessionValidator, upstream::UpstreamClient};

/// Application state shared across handlers and middleware
#[derive(Clone, Debug)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Route classification shared by the CSRF guard and body limiter
    pub routes: Arc<RoutePolicy>,
    pub csrf: CsrfGuard,
    pub sessions: Arc<SessionValidator>,
    /// Upstream client (one connection pool for the process)
    pub upstream: Arc<UpstreamClient>,
    /// Access log queue
    pub access_log: AccessLog,
}

impl AppState {
    pub fn new(config: AppConfig, access_log: AccessLog) -> Result<Self> {
        let routes = Arc::new(RoutePolicy::from_config(&config));
        let csrf = CsrfGuard::new(routes.clone(), &config.csrf, config.server.secure_cookies)?;
        let sessions = Arc::new(SessionValidator::new(config.session.effective_secret()));
        let upstream = Arc::new(UpstreamClient::new(&config.upstream)?);

        Ok(Self {
            config,
            routes,
            csrf,
            sessions,
            upstream,
            access_log,
        })
    }
}
