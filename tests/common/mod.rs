//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - The test application (router, state, access log)
//! - Session token and CSRF helpers


pub use test_app::*;
