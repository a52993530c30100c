//! Operator-facing reports produced by the lifecycle controller.

use crate::supervisor::{ManagedUnit, UnitState};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Whether a network endpoint answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn is_reachable(&self) -> bool {
        *self == Reachability::Reachable
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Reachable => write!(f, "reachable"),
            Reachability::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// State of one supervised unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub unit: ManagedUnit,
    pub name: String,
    pub state: UnitState,
}

/// Result of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub hostname: String,
    pub home: PathBuf,
    pub units: Vec<UnitStatus>,
    pub api_url: String,
    pub api: Reachability,
}

impl StatusReport {
    pub fn active_units(&self) -> Vec<ManagedUnit> {
        self.units
            .iter()
            .filter(|u| u.state.is_active())
            .map(|u| u.unit)
            .collect()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Issuer Node Status")?;
        writeln!(f, "==================")?;
        writeln!(f, "Host: {}", self.hostname)?;
        writeln!(f, "Home: {}", self.home.display())?;
        writeln!(f, "\nUnits:")?;
        for unit in &self.units {
            writeln!(f, "  {:<28} {}", unit.name, unit.state)?;
        }
        write!(f, "\nAPI ({}): {}", self.api_url, self.api)
    }
}

/// Reachability of one backing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointProbe {
    pub name: &'static str,
    pub target: String,
    pub status: Reachability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of `check-config`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigCheck {
    pub env_file: PathBuf,
    pub missing_keys: Vec<&'static str>,
    pub database: EndpointProbe,
    pub cache: EndpointProbe,
}

impl ConfigCheck {
    /// All keys present and both services reachable.
    pub fn is_healthy(&self) -> bool {
        self.missing_keys.is_empty()
            && self.database.status.is_reachable()
            && self.cache.status.is_reachable()
    }
}

impl fmt::Display for ConfigCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Environment file: {}", self.env_file.display())?;
        if self.missing_keys.is_empty() {
            writeln!(f, "✓ All required keys present")?;
        } else {
            writeln!(f, "✗ Missing keys: {}", self.missing_keys.join(", "))?;
        }
        for probe in [&self.database, &self.cache] {
            let mark = if probe.status.is_reachable() { "✓" } else { "✗" };
            write!(f, "{} {} ({}): {}", mark, probe.name, probe.target, probe.status)?;
            if let Some(detail) = &probe.detail {
                write!(f, " - {}", detail)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Result of `import-key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyImport {
    pub key_store: PathBuf,
    pub created: bool,
    /// Command the operator runs to finish the import.
    pub command: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(states: [UnitState; 3]) -> StatusReport {
        StatusReport {
            hostname: "node-1".to_string(),
            home: PathBuf::from("/opt/issuer"),
            units: ManagedUnit::ALL
                .iter()
                .zip(states)
                .map(|(unit, state)| UnitStatus {
                    unit: *unit,
                    name: unit.unit_name("issuer"),
                    state,
                })
                .collect(),
            api_url: "http://localhost:3001".to_string(),
            api: Reachability::Unreachable,
        }
    }

    #[test]
    fn test_status_text() {
        let text = report([UnitState::Active, UnitState::Inactive, UnitState::Active]).to_string();
        assert!(text.contains("Host: node-1"));
        assert!(text.contains("issuer-notifications"));
        assert!(text.ends_with("API (http://localhost:3001): unreachable"));
    }

    #[test]
    fn test_status_json() {
        let json = serde_json::to_value(report([UnitState::Inactive; 3])).unwrap();
        assert_eq!(json["units"][2]["unit"], "pending_publisher");
        assert_eq!(json["units"][0]["state"], "inactive");
        assert_eq!(json["api"], "unreachable");
    }

    #[test]
    fn test_config_check_health() {
        let probe = |name: &'static str, status: Reachability| EndpointProbe {
            name,
            target: "localhost".to_string(),
            status,
            detail: None,
        };
        let mut check = ConfigCheck {
            env_file: PathBuf::from("/opt/issuer/.env-issuer"),
            missing_keys: vec![],
            database: probe("database", Reachability::Reachable),
            cache: probe("cache", Reachability::Reachable),
        };
        assert!(check.is_healthy());

        check.cache.status = Reachability::Unreachable;
        assert!(!check.is_healthy());
        assert!(check.to_string().contains("✗ cache"));
    }
}
