//! Route classes
//!
//! The gatekeeper distinguishes a few classes of paths that are treated
//! differently by the middleware chain. Classification lives here so the
//! CSRF guard and the body size limiter always agree on which class a path
//! belongs to.

use crate::config::AppConfig;

/// How a path is protected by the middleware chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Bearer-authenticated machine-to-machine routes under the API prefix
    MachineApi,
    /// The protocol (tool-call) endpoint and anything beneath it
    Protocol,
    /// Cookie-authenticated browser routes, including unmatched paths that
    /// are forwarded upstream
    Browser,
}

/// Path classification rules derived from configuration
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    api_prefix: String,
    protocol_path: String,
    exempt_paths: Vec<String>,
    max_body_bytes: usize,
    protocol_max_body_bytes: usize,
}

impl RoutePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            api_prefix: config.routes.api_prefix.clone(),
            protocol_path: config.routes.protocol_path.trim_end_matches('/').to_string(),
            exempt_paths: config.csrf.exempt_paths.clone(),
            max_body_bytes: config.limits.max_body_bytes,
            protocol_max_body_bytes: config.limits.protocol_max_body_bytes,
        }
    }

    /// Classify a request path
    pub fn classify(&self, path: &str) -> RouteClass {
        if self.is_protocol(path) {
            RouteClass::Protocol
        } else if path.starts_with(&self.api_prefix) {
            RouteClass::MachineApi
        } else {
            RouteClass::Browser
        }
    }

    fn is_protocol(&self, path: &str) -> bool {
        match path.strip_prefix(self.protocol_path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Whether unsafe requests to this path skip the CSRF double-submit check.
    ///
    /// Exempt routes are authenticated with bearer tokens rather than cookies.
    pub fn is_csrf_exempt(&self, path: &str) -> bool {
        match self.classify(path) {
            RouteClass::MachineApi | RouteClass::Protocol => true,
            RouteClass::Browser => self.exempt_paths.iter().any(|p| p == path),
        }
    }

    /// Maximum request body size accepted on this path
    pub fn body_limit(&self, path: &str) -> usize {
        match self.classify(path) {
            RouteClass::Protocol => self.protocol_max_body_bytes,
            RouteClass::MachineApi | RouteClass::Browser => self.max_body_bytes,
        }
    }

    pub fn protocol_path(&self) -> &str {
        &self.protocol_path
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }
}
