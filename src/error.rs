//! Error types and error handling for issuerctl.
//!
//! This module defines all error types used throughout the application,
//! the stable error codes shown in diagnostics, and the CLI exit codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes.
/// Each error has a unique code for identification in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// E001: Orchestrator configuration is invalid
    #[serde(rename = "E001")]
    ConfigInvalid,

    /// E002: Required system dependency is missing or too old
    #[serde(rename = "E002")]
    DependencyUnavailable,

    /// E003: An external command failed
    #[serde(rename = "E003")]
    CommandFailed,

    /// E004: Source checkout failed
    #[serde(rename = "E004")]
    WorkspaceFailed,

    /// E005: Build of a target failed
    #[serde(rename = "E005")]
    BuildFailed,

    /// E006: Database provisioning or migration failed
    #[serde(rename = "E006")]
    DatabaseFailed,

    /// E007: Supervisor operation failed
    #[serde(rename = "E007")]
    SupervisorFailed,

    /// E008: Failed to reach the platform API
    #[serde(rename = "E008")]
    ConnectionError,

    /// E009: Operation timed out
    #[serde(rename = "E009")]
    Timeout,

    /// E010: Installation home is locked by another invocation
    #[serde(rename = "E010")]
    HomeLocked,

    /// E011: Command line usage error
    #[serde(rename = "E011")]
    Usage,
}

impl ErrorCode {
    /// Returns the error code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalid => "E001",
            ErrorCode::DependencyUnavailable => "E002",
            ErrorCode::CommandFailed => "E003",
            ErrorCode::WorkspaceFailed => "E004",
            ErrorCode::BuildFailed => "E005",
            ErrorCode::DatabaseFailed => "E006",
            ErrorCode::SupervisorFailed => "E007",
            ErrorCode::ConnectionError => "E008",
            ErrorCode::Timeout => "E009",
            ErrorCode::HomeLocked => "E010",
            ErrorCode::Usage => "E011",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// CLI exit codes.
pub mod exit_code {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration error
    pub const CONFIG_ERROR: i32 = 2;
    /// Connection error
    pub const CONNECTION_ERROR: i32 = 3;
    /// Timeout error
    pub const TIMEOUT_ERROR: i32 = 4;
    /// Missing or outdated dependency
    pub const DEPENDENCY_ERROR: i32 = 5;
    /// Installation home held by another invocation
    pub const LOCKED_ERROR: i32 = 6;
    /// Command line argument error
    pub const CLI_ERROR: i32 = 64;
}

/// The main error type for issuerctl.
#[derive(Debug, Error)]
pub enum IssuerError {
    /// Configuration file is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A required tool is absent and cannot be installed.
    #[error("Missing dependency: {name} ({hint})")]
    DependencyMissing { name: String, hint: String },

    /// A required tool is present but older than the supported minimum.
    #[error("Dependency {name} is version {found}, need at least {required}")]
    DependencyTooOld {
        name: String,
        found: String,
        required: String,
    },

    /// An external command could not be spawned or exited unsuccessfully.
    #[error("Command failed: {program}: {message}")]
    Command {
        program: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cloning or checking out the source tree failed.
    #[error("Workspace error: {message}")]
    Workspace { message: String },

    /// A build target failed to compile.
    #[error("Build of '{target}' failed: {message}")]
    Build { target: String, message: String },

    /// Database provisioning or migration failed.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Writing units or talking to the supervisor failed.
    #[error("Supervisor error: {message}")]
    Supervisor {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to connect to the platform API.
    #[error("Connection error: {target}")]
    Connection {
        target: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The platform API answered with a non-success status.
    #[error("Platform API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Operation timed out.
    #[error("Timeout: {operation} (waited {seconds}s)")]
    Timeout { operation: String, seconds: u64 },

    /// Another invocation holds the installation home lock.
    #[error("Installation home is locked: {path}")]
    Locked { path: String },

    /// Command line usage error.
    #[error("Usage: {message}")]
    Usage { message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IssuerError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            IssuerError::Config { .. } => ErrorCode::ConfigInvalid,
            IssuerError::DependencyMissing { .. } | IssuerError::DependencyTooOld { .. } => {
                ErrorCode::DependencyUnavailable
            }
            IssuerError::Command { .. } => ErrorCode::CommandFailed,
            IssuerError::Workspace { .. } => ErrorCode::WorkspaceFailed,
            IssuerError::Build { .. } => ErrorCode::BuildFailed,
            IssuerError::Database { .. } => ErrorCode::DatabaseFailed,
            IssuerError::Supervisor { .. } => ErrorCode::SupervisorFailed,
            IssuerError::Connection { .. } | IssuerError::Api { .. } => ErrorCode::ConnectionError,
            IssuerError::Timeout { .. } => ErrorCode::Timeout,
            IssuerError::Locked { .. } => ErrorCode::HomeLocked,
            IssuerError::Usage { .. } => ErrorCode::Usage,
            IssuerError::Io(_) => ErrorCode::CommandFailed,
            IssuerError::Yaml(_) => ErrorCode::ConfigInvalid,
            IssuerError::Json(_) => ErrorCode::ConnectionError,
        }
    }

    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            IssuerError::Config { .. } | IssuerError::Yaml(_) => exit_code::CONFIG_ERROR,
            IssuerError::Connection { .. } => exit_code::CONNECTION_ERROR,
            IssuerError::Timeout { .. } => exit_code::TIMEOUT_ERROR,
            IssuerError::DependencyMissing { .. } | IssuerError::DependencyTooOld { .. } => {
                exit_code::DEPENDENCY_ERROR
            }
            IssuerError::Locked { .. } => exit_code::LOCKED_ERROR,
            IssuerError::Usage { .. } => exit_code::CLI_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        IssuerError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        IssuerError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a command error with a message.
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        IssuerError::Command {
            program: program.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a command error with a message and source.
    pub fn command_with_source(
        program: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        IssuerError::Command {
            program: program.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a workspace error.
    pub fn workspace(message: impl Into<String>) -> Self {
        IssuerError::Workspace {
            message: message.into(),
        }
    }

    /// Creates a build error for a target.
    pub fn build(target: impl Into<String>, message: impl Into<String>) -> Self {
        IssuerError::Build {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        IssuerError::Database {
            message: message.into(),
        }
    }

    /// Creates a supervisor error with a message.
    pub fn supervisor(message: impl Into<String>) -> Self {
        IssuerError::Supervisor {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a supervisor error with a message and source.
    pub fn supervisor_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        IssuerError::Supervisor {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a connection error.
    pub fn connection(target: impl Into<String>) -> Self {
        IssuerError::Connection {
            target: target.into(),
            source: None,
        }
    }

    /// Creates a connection error with a source.
    pub fn connection_with_source(
        target: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        IssuerError::Connection {
            target: target.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        IssuerError::Usage {
            message: message.into(),
        }
    }
}

/// Result type alias for issuerctl operations.
pub type Result<T> = std::result::Result<T, IssuerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::ConfigInvalid.as_str(), "E001");
        assert_eq!(ErrorCode::DependencyUnavailable.as_str(), "E002");
        assert_eq!(ErrorCode::BuildFailed.as_str(), "E005");
        assert_eq!(ErrorCode::HomeLocked.as_str(), "E010");
        assert_eq!(ErrorCode::Usage.as_str(), "E011");
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::DatabaseFailed).unwrap();
        assert_eq!(json, "\"E006\"");
    }

    #[test]
    fn test_issuer_error_code() {
        let err = IssuerError::DependencyMissing {
            name: "go".to_string(),
            hint: "install Go".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::DependencyUnavailable);

        let err = IssuerError::config("invalid yaml");
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);

        let err = IssuerError::Api {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::ConnectionError);
    }

    #[test]
    fn test_issuer_error_exit_code() {
        let err = IssuerError::config("invalid yaml");
        assert_eq!(err.exit_code(), exit_code::CONFIG_ERROR);

        let err = IssuerError::connection("http://localhost:3001");
        assert_eq!(err.exit_code(), exit_code::CONNECTION_ERROR);

        let err = IssuerError::Timeout {
            operation: "health".to_string(),
            seconds: 5,
        };
        assert_eq!(err.exit_code(), exit_code::TIMEOUT_ERROR);

        let err = IssuerError::DependencyTooOld {
            name: "go".to_string(),
            found: "1.18.0".to_string(),
            required: "1.21.0".to_string(),
        };
        assert_eq!(err.exit_code(), exit_code::DEPENDENCY_ERROR);

        let err = IssuerError::usage("missing key");
        assert_eq!(err.exit_code(), exit_code::CLI_ERROR);

        let err = IssuerError::build("platform", "exit status 1");
        assert_eq!(err.exit_code(), exit_code::GENERAL_ERROR);

        // the API answered, so this is not a connection failure
        let err = IssuerError::Api {
            status: 409,
            body: "conflict".to_string(),
        };
        assert_eq!(err.exit_code(), exit_code::GENERAL_ERROR);
    }

    #[test]
    fn test_error_source_is_kept() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = IssuerError::config_with_source("Cannot read settings", io);
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("no such file".to_string())
        );

        let err = IssuerError::supervisor("daemon-reload failed");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = IssuerError::build("migrate", "exit status 2");
        assert_eq!(format!("{}", err), "Build of 'migrate' failed: exit status 2");

        let err = IssuerError::Timeout {
            operation: "GET /status".to_string(),
            seconds: 5,
        };
        assert_eq!(format!("{}", err), "Timeout: GET /status (waited 5s)");
    }
}
