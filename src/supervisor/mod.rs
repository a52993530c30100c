//! Supervisor module - process supervisor abstraction and unit definitions.
//!
//! The orchestrator never owns the runtime state of the platform processes;
//! it writes unit definitions, issues start/stop commands and reads back
//! whatever state the supervisor reports.

pub mod registrar;
pub mod systemd;

use crate::error::{IssuerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use registrar::ServiceRegistrar;
pub use systemd::SystemdSupervisor;

/// Unit state as reported by the supervisor.
///
/// A crashed unit and a stopped unit both read as inactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitState {
    Active,
    Inactive,
}

impl UnitState {
    /// Maps supervisor state words onto the two observable states.
    pub fn from_supervisor(word: &str) -> Self {
        match word.trim() {
            "active" | "activating" | "reloading" => UnitState::Active,
            _ => UnitState::Inactive,
        }
    }

    pub fn is_active(&self) -> bool {
        *self == UnitState::Active
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitState::Active => write!(f, "active"),
            UnitState::Inactive => write!(f, "inactive"),
        }
    }
}

/// The three supervised platform processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedUnit {
    /// API server.
    Platform,
    /// Notification worker.
    Notifications,
    /// Pending-publisher worker.
    PendingPublisher,
}

impl ManagedUnit {
    /// Fixed start and stop order.
    pub const ALL: [ManagedUnit; 3] = [
        ManagedUnit::Platform,
        ManagedUnit::Notifications,
        ManagedUnit::PendingPublisher,
    ];

    /// Logical name, also the name of the executable.
    pub fn logical_name(&self) -> &'static str {
        match self {
            ManagedUnit::Platform => "platform",
            ManagedUnit::Notifications => "notifications",
            ManagedUnit::PendingPublisher => "pending_publisher",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ManagedUnit::Platform => "Issuer platform API server",
            ManagedUnit::Notifications => "Issuer notification worker",
            ManagedUnit::PendingPublisher => "Issuer pending publisher worker",
        }
    }

    /// Supervisor unit name, e.g. `issuer-pending-publisher`.
    pub fn unit_name(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.logical_name().replace('_', "-"))
    }
}

impl std::fmt::Display for ManagedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.logical_name())
    }
}

impl std::str::FromStr for ManagedUnit {
    type Err = IssuerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "platform" | "api" => Ok(ManagedUnit::Platform),
            "notifications" => Ok(ManagedUnit::Notifications),
            "pending_publisher" | "publisher" => Ok(ManagedUnit::PendingPublisher),
            _ => Err(IssuerError::usage(format!(
                "Unknown unit '{}'. Valid units: platform, notifications, pending_publisher",
                s
            ))),
        }
    }
}

/// Supervisor action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
}

impl std::fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
        }
    }
}

/// Result of a start or stop issued for one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitOperationResult {
    /// The unit name.
    pub unit: String,
    /// The action performed.
    pub action: ServiceAction,
    /// Whether the supervisor accepted the command.
    pub success: bool,
    /// Supervisor output on failure.
    pub message: Option<String>,
}

impl UnitOperationResult {
    pub fn success(unit: impl Into<String>, action: ServiceAction) -> Self {
        Self {
            unit: unit.into(),
            action,
            success: true,
            message: None,
        }
    }

    pub fn failure(
        unit: impl Into<String>,
        action: ServiceAction,
        message: impl Into<String>,
    ) -> Self {
        Self {
            unit: unit.into(),
            action,
            success: false,
            message: Some(message.into()),
        }
    }
}

/// One supervisor unit definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDefinition {
    /// Unit name without suffix.
    pub name: String,
    pub description: String,
    pub working_dir: PathBuf,
    pub env_file: PathBuf,
    pub exec_start: PathBuf,
    /// Restart backoff in seconds; restart policy is always.
    pub restart_sec: u64,
    /// Units that must be started first.
    pub after: Vec<String>,
    pub user: Option<String>,
}

impl UnitDefinition {
    /// Renders the definition as a systemd unit file.
    pub fn render(&self) -> String {
        let after = self.after.join(" ");
        let mut out = String::new();

        out.push_str("[Unit]\n");
        out.push_str(&format!("Description={}\n", self.description));
        if !after.is_empty() {
            out.push_str(&format!("After={}\n", after));
            out.push_str(&format!("Wants={}\n", after));
        }

        out.push_str("\n[Service]\n");
        out.push_str("Type=simple\n");
        if let Some(user) = &self.user {
            out.push_str(&format!("User={}\n", user));
        }
        out.push_str(&format!("WorkingDirectory={}\n", self.working_dir.display()));
        out.push_str(&format!("EnvironmentFile={}\n", self.env_file.display()));
        out.push_str(&format!("ExecStart={}\n", self.exec_start.display()));
        out.push_str("Restart=always\n");
        out.push_str(&format!("RestartSec={}\n", self.restart_sec));

        out.push_str("\n[Install]\n");
        out.push_str("WantedBy=multi-user.target\n");
        out
    }
}

/// Trait for process supervisors.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Returns the name of this supervisor.
    fn name(&self) -> &'static str;

    /// Writes (or overwrites) a unit definition.
    async fn write_unit(&self, unit: &UnitDefinition) -> Result<()>;

    /// Reloads the supervisor's definition cache.
    async fn reload(&self) -> Result<()>;

    /// Enables a unit at boot.
    async fn enable(&self, unit: &str) -> Result<()>;

    /// Starts a unit.
    async fn start(&self, unit: &str) -> Result<UnitOperationResult>;

    /// Stops a unit.
    async fn stop(&self, unit: &str) -> Result<UnitOperationResult>;

    /// Reports whether a unit is active.
    async fn state(&self, unit: &str) -> Result<UnitState>;

    /// Follows the unit's log until interrupted.
    async fn stream_logs(&self, unit: &str) -> Result<()>;
}
