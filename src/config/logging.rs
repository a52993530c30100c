//! Logging section of the settings file.

use serde::{Deserialize, Serialize};
use tracing::Level;

/// `logging:` section. Flags on the command line take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used when no `-v`/`-q` flag is given.
    pub level: Option<LogLevel>,

    pub format: LogFormat,
}

impl LoggingConfig {
    /// Picks the level: an explicit flag, then this section, then info.
    pub fn effective_level(&self, flag: Option<Level>) -> Level {
        flag.or(self.level.map(Level::from)).unwrap_or(Level::INFO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Output format of diagnostics on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, for journald or log shippers.
    Json,
}
