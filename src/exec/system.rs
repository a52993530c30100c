//! Executor backed by real processes.

use crate::config::PrivilegeConfig;
use crate::error::{IssuerError, Result};
use crate::exec::{CommandOutput, CommandSpec, Executor};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Runs commands with `tokio::process`, escalating through a configured
/// program (normally `sudo`).
pub struct SystemExecutor {
    escalate: Option<String>,
    timeout: Duration,
}

impl SystemExecutor {
    pub fn new(privilege: &PrivilegeConfig, timeout: Duration) -> Self {
        Self {
            escalate: privilege.program().map(str::to_string),
            timeout,
        }
    }

    /// Builds the process for a spec, prefixing the escalation program.
    fn command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = match (&self.escalate, spec.needs_escalation()) {
            (Some(escalate), true) => {
                let mut cmd = Command::new(escalate);
                if let Some(user) = &spec.run_as {
                    cmd.arg("-u").arg(user);
                }
                // sudo resets the environment; pass ours through env(1)
                if !spec.env.is_empty() {
                    cmd.arg("env");
                    for (key, value) in &spec.env {
                        cmd.arg(format!("{}={}", key, value));
                    }
                }
                cmd.arg(&spec.program).args(&spec.args);
                cmd
            }
            (None, true) if spec.run_as.is_some() => {
                warn!(
                    command = %spec,
                    "No escalation program configured, running as current user"
                );
                let mut cmd = Command::new(&spec.program);
                cmd.args(&spec.args);
                cmd
            }
            _ => {
                let mut cmd = Command::new(&spec.program);
                cmd.args(&spec.args);
                cmd
            }
        };

        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec, privileged = spec.needs_escalation(), "Executing command");

        let mut cmd = self.command(spec);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| IssuerError::Timeout {
                operation: spec.command_line(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                IssuerError::command_with_source(&spec.program, "failed to spawn", e)
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        debug!(
            command = %spec,
            exit_code = result.code,
            stdout = %result.stdout,
            stderr = %result.stderr,
            "Command completed"
        );

        Ok(result)
    }

    async fn stream(&self, spec: &CommandSpec) -> Result<()> {
        debug!(command = %spec, "Streaming command");

        let mut child = self
            .command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                IssuerError::command_with_source(&spec.program, "failed to spawn", e)
            })?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| {
                    IssuerError::command_with_source(&spec.program, "wait failed", e)
                })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(IssuerError::command(
                        &spec.program,
                        format!("exited with {}", status),
                    ))
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(command = %spec, "Interrupted, stopping stream");
                let _ = child.kill().await;
                Ok(())
            }
        }
    }

    async fn write_file(&self, path: &Path, contents: &str, privileged: bool) -> Result<()> {
        let escalate = match (&self.escalate, privileged) {
            (Some(escalate), true) => escalate,
            _ => {
                debug!(path = %path.display(), "Writing file");
                return tokio::fs::write(path, contents).await.map_err(Into::into);
            }
        };

        debug!(path = %path.display(), "Writing file through {}", escalate);

        let mut child = Command::new(escalate)
            .arg("tee")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IssuerError::command_with_source(escalate, "failed to spawn tee", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| IssuerError::Timeout {
                operation: format!("write {}", path.display()),
                seconds: self.timeout.as_secs(),
            })??;

        if output.status.success() {
            Ok(())
        } else {
            Err(IssuerError::command(
                escalate,
                format!(
                    "tee {} failed: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "Creating directory");
        tokio::fs::create_dir_all(path).await.map_err(|e| {
            IssuerError::workspace(format!("Failed to create {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn direct() -> SystemExecutor {
        let privilege = PrivilegeConfig {
            escalate: String::new(),
        };
        SystemExecutor::new(&privilege, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let executor = direct();
        let spec = CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]);

        let output = executor.run(&spec).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_run_passes_env_and_cwd() {
        let dir = TempDir::new().unwrap();
        let executor = direct();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $ISSUER_TEST_VAR; pwd"])
            .env("ISSUER_TEST_VAR", "value")
            .current_dir(dir.path());

        let output = executor.run(&spec).await.unwrap();
        assert!(output.success());
        assert!(output.stdout.starts_with("value\n"));
    }

    #[tokio::test]
    async fn test_run_missing_program_is_error() {
        let executor = direct();
        let result = executor
            .run(&CommandSpec::new("issuerctl-definitely-not-a-program"))
            .await;
        assert!(matches!(result, Err(IssuerError::Command { .. })));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let privilege = PrivilegeConfig {
            escalate: String::new(),
        };
        let executor = SystemExecutor::new(&privilege, Duration::from_millis(100));
        let result = executor.run(&CommandSpec::new("sleep").arg("5")).await;
        assert!(matches!(result, Err(IssuerError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_which() {
        let executor = direct();
        assert!(executor.which("sh").await.unwrap());
        assert!(!executor.which("issuerctl-definitely-not-a-program").await.unwrap());
    }

    #[tokio::test]
    async fn test_write_file_unprivileged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("unit.service");
        let executor = direct();

        executor.write_file(&path, "[Unit]\n", true).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[Unit]\n");
    }

    #[tokio::test]
    async fn test_create_dir_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("home/keys");
        let executor = direct();

        executor.create_dir_all(&path).await.unwrap();
        executor.create_dir_all(&path).await.unwrap();
        assert!(path.is_dir());
    }
}
