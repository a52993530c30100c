//! issuerctl - Issuer node deployment orchestrator
//!
//! This crate installs and supervises a single-node identity issuer
//! platform: it provisions system dependencies, syncs and builds the
//! platform sources, initializes the database, registers the platform
//! processes with the process supervisor and drives their lifecycle.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Configuration file parsing and validation
//! - [`error`] - Error types and error handling
//! - [`home`] - Installation home layout and its exclusive lock
//! - [`exec`] - The executor through which every external command runs
//! - [`provision`] - Install-time steps and the resumable install pipeline
//! - [`supervisor`] - Process supervisor abstraction and unit registration
//! - [`client`] - Issuer platform HTTP API client
//! - [`controller`] - Runtime lifecycle operations

pub mod cli;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod exec;
pub mod home;
pub mod provision;
pub mod supervisor;

// Re-exports for convenience
pub use cli::Cli;
pub use client::PlatformClient;
pub use config::Config;
pub use controller::LifecycleController;
pub use error::{ErrorCode, IssuerError, Result};
pub use home::{HomeLock, InstallationHome};
pub use provision::InstallPipeline;
