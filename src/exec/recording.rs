//! Executor that records instead of running.
//!
//! Used by `--dry-run` and by tests. Responses can be scripted per command
//! line fragment; anything unscripted succeeds with empty output. Read-only
//! commands go to the passthrough executor when one is set, so a dry run
//! still reports real unit states.

use crate::error::{IssuerError, Result};
use crate::exec::{CommandOutput, CommandSpec, Executor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Run(CommandSpec),
    Stream(CommandSpec),
    Write {
        path: PathBuf,
        contents: String,
        privileged: bool,
    },
    CreateDir(PathBuf),
}

#[derive(Default)]
struct Script {
    responses: Vec<(String, CommandOutput)>,
    failing_writes: Vec<String>,
}

/// Records every call; only read-only commands may touch the system.
#[derive(Default)]
pub struct RecordingExecutor {
    log: Mutex<Vec<Recorded>>,
    script: Mutex<Script>,
    passthrough: Option<Arc<dyn Executor>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Really runs commands marked read-only through `inner`.
    pub fn with_passthrough(mut self, inner: Arc<dyn Executor>) -> Self {
        self.passthrough = Some(inner);
        self
    }

    fn passthrough_for(&self, spec: &CommandSpec) -> Option<&Arc<dyn Executor>> {
        self.passthrough.as_ref().filter(|_| spec.read_only)
    }

    /// Answers commands whose command line contains `fragment`.
    /// Later registrations take precedence.
    pub fn respond(&self, fragment: impl Into<String>, output: CommandOutput) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.responses.push((fragment.into(), output));
        }
        self
    }

    /// Makes `which(program)` report the program as absent.
    pub fn missing(&self, program: &str) -> &Self {
        self.respond(
            format!("command -v {}", shell_words::quote(program)),
            CommandOutput::failed(1, ""),
        )
    }

    /// Makes writes to paths containing `fragment` fail.
    pub fn fail_writes(&self, fragment: impl Into<String>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.failing_writes.push(fragment.into());
        }
        self
    }

    /// All recorded interactions, in order.
    pub fn recorded(&self) -> Vec<Recorded> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Command lines of recorded `run` and `stream` calls, in order.
    pub fn commands(&self) -> Vec<String> {
        self.recorded()
            .into_iter()
            .filter_map(|entry| match entry {
                Recorded::Run(spec) | Recorded::Stream(spec) => Some(spec.command_line()),
                Recorded::Write { .. } | Recorded::CreateDir(_) => None,
            })
            .collect()
    }

    /// Directories that would have been created, in order.
    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.recorded()
            .into_iter()
            .filter_map(|entry| match entry {
                Recorded::CreateDir(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Recorded file writes as (path, contents).
    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.recorded()
            .into_iter()
            .filter_map(|entry| match entry {
                Recorded::Write { path, contents, .. } => Some((path, contents)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: Recorded) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }

    fn response_for(&self, spec: &CommandSpec) -> CommandOutput {
        let line = spec.command_line();
        self.script
            .lock()
            .ok()
            .and_then(|script| {
                script
                    .responses
                    .iter()
                    .rev()
                    .find(|(fragment, _)| line.contains(fragment.as_str()))
                    .map(|(_, output)| output.clone())
            })
            .unwrap_or_else(CommandOutput::ok)
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.push(Recorded::Run(spec.clone()));
        if let Some(inner) = self.passthrough_for(spec) {
            debug!(command = %spec, "[dry-run] running read-only command");
            return inner.run(spec).await;
        }
        info!(command = %spec, privileged = spec.needs_escalation(), "[dry-run] run");
        Ok(self.response_for(spec))
    }

    async fn stream(&self, spec: &CommandSpec) -> Result<()> {
        self.push(Recorded::Stream(spec.clone()));
        if let Some(inner) = self.passthrough_for(spec) {
            return inner.stream(spec).await;
        }
        info!(command = %spec, "[dry-run] stream");
        let output = self.response_for(spec);
        if output.success() {
            Ok(())
        } else {
            Err(IssuerError::command(&spec.program, output.combined()))
        }
    }

    async fn write_file(&self, path: &Path, contents: &str, privileged: bool) -> Result<()> {
        info!(path = %path.display(), privileged, "[dry-run] write");
        self.push(Recorded::Write {
            path: path.to_path_buf(),
            contents: contents.to_string(),
            privileged,
        });

        let display = path.display().to_string();
        let fails = self
            .script
            .lock()
            .map(|script| {
                script
                    .failing_writes
                    .iter()
                    .any(|fragment| display.contains(fragment.as_str()))
            })
            .unwrap_or(false);

        if fails {
            Err(IssuerError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", display),
            )))
        } else {
            Ok(())
        }
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "[dry-run] create directory");
        self.push(Recorded::CreateDir(path.to_path_buf()));
        Ok(())
    }
}
