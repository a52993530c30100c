//! Executor module - the single capability through which external commands run.
//!
//! Every process the orchestrator spawns (package installs, git, the Go
//! toolchain, psql, systemctl) goes through an [`Executor`]. Privileged
//! commands are only marked as such; the executor decides how to escalate.
//! This keeps the rest of the crate privilege-agnostic and lets tests and
//! `--dry-run` substitute the [`RecordingExecutor`].

pub mod recording;
pub mod system;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

pub use recording::{Recorded, RecordingExecutor};
pub use system::SystemExecutor;

/// Description of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Requires elevated rights.
    pub privileged: bool,
    /// Run as this account (implies escalation).
    pub run_as: Option<String>,
    /// Only observes the system, so a dry run may really execute it.
    pub read_only: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Whether the executor has to escalate for this command.
    pub fn needs_escalation(&self) -> bool {
        self.privileged || self.run_as.is_some()
    }

    /// Program and arguments, shell-quoted.
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (None when killed by a signal).
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful, silent result.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn ok_with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout and stderr joined the way operators expect to read them.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Capability for running external commands and writing privileged files.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Returns the name of this executor.
    fn name(&self) -> &'static str;

    /// Runs a command to completion and captures its output.
    ///
    /// An unsuccessful exit is reported in the output, not as an error;
    /// errors are reserved for spawn failures and timeouts.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Runs a command attached to the terminal until it exits or the
    /// operator interrupts it.
    async fn stream(&self, spec: &CommandSpec) -> Result<()>;

    /// Writes a file, escalating when `privileged` is set.
    async fn write_file(&self, path: &Path, contents: &str, privileged: bool) -> Result<()>;

    /// Creates a directory and its missing parents.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Checks whether a program is on the search path.
    async fn which(&self, program: &str) -> Result<bool> {
        let probe = CommandSpec::new("sh")
            .arg("-c")
            .arg(format!("command -v {}", shell_words::quote(program)));
        Ok(self.run(&probe).await?.success())
    }
}
