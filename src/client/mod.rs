//! HTTP client module for issuerctl.
//!
//! This module provides the client for the running issuer platform API.

pub mod api;

pub use api::{ApiReply, PlatformClient};
