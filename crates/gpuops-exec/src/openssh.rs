//! Remote execution through the system `ssh` binary using `tokio::process`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::keys::ResolvedKey;
use crate::result::{CommandResult, ConnectionInfo};
use crate::traits::RemoteExecutor;

/// Exit status the client uses for its own errors
const SSH_FAILURE: i32 = 255;

/// Executor that shells out to OpenSSH
///
/// Each `run` spawns one `ssh` process. Agent authentication works here
/// because the child inherits `SSH_AUTH_SOCK`.
#[derive(Debug, Clone)]
pub struct OpenSshExecutor {
    conn_info: ConnectionInfo,
    key: Arc<ResolvedKey>,
    program: PathBuf,
}

impl OpenSshExecutor {
    /// Create an executor for one node
    pub fn new(conn_info: ConnectionInfo, key: Arc<ResolvedKey>) -> Self {
        Self {
            conn_info,
            key,
            program: PathBuf::from("ssh"),
        }
    }

    /// Use a different client binary
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments passed to the client, destination and command last
    #[must_use]
    pub fn ssh_args(&self, cmd: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(14);

        if let Some(path) = self.key.path() {
            args.push("-i".to_string());
            args.push(path.display().to_string());
        }

        args.push("-p".to_string());
        args.push(self.conn_info.port.to_string());
        args.extend(
            [
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "-o",
                "BatchMode=yes",
                "-o",
                "LogLevel=ERROR",
            ]
            .map(String::from),
        );

        args.push(self.conn_info.destination());
        args.push(cmd.to_string());
        args
    }

    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, "spawning ssh");

        let child = Command::new(&self.program)
            .args(self.ssh_args(cmd))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();

        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        // 255 is ssh's own failure (refused, unresolvable, key rejected);
        // a remote command exiting 255 is indistinguishable and reported the same
        if status == SSH_FAILURE {
            let message = match stderr.trim() {
                "" => format!("ssh to {} failed", self.conn_info.destination()),
                text => text.to_string(),
            };
            return Err(ExecError::ConnectionFailed(message));
        }

        debug!(
            status = status,
            duration = ?duration,
            "ssh exited"
        );

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

#[async_trait]
impl RemoteExecutor for OpenSshExecutor {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        self.execute(cmd).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        match timeout(timeout_duration, self.execute(cmd)).await {
            Ok(res) => res,
            Err(_) => {
                error!(
                    host = %self.conn_info.host,
                    command = %cmd,
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    fn executor_type(&self) -> &'static str {
        "openssh"
    }
}
