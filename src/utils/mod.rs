//! Utility modules

pub mod error;

pub use error::{AppResult, ErrorResponse, GatewayError};
