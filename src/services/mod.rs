//! Business logic services
//!
//! This module contains the services behind the handlers and middleware:
//! session token validation, the access log, and the upstream client.

pub mod access_log;
pub mod session;
pub mod upstream;

pub use access_log::{AccessLog, AccessRecord};
pub use session::{SessionClaims, SessionError, SessionValidator};
pub use upstream::{ProxyError, UpstreamClient};
