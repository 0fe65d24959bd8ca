//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;
use crate::target::Target;

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success, -1 if the remote never reported one)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Connection information for SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name
    pub user: String,
}

fn default_port() -> u16 {
    22
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@host` destination string
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// What one node produced during a fleet batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostOutcome {
    /// Node the command ran against
    pub target: Target,
    /// Captured text: stdout then stderr, or the error message if the
    /// command could not be invoked
    pub output: String,
    /// Remote exit status, `None` when the command never ran. The system
    /// `ssh` client's exit 255 counts as never ran.
    pub status: Option<i32>,
    /// True only when the remote command exited with status 0
    pub succeeded: bool,
    /// Time spent on this node, including connection setup
    pub duration: Duration,
}

impl HostOutcome {
    /// Fold a transport result into a per-node outcome
    pub fn from_result(
        target: Target,
        result: Result<CommandResult, ExecError>,
        duration: Duration,
    ) -> Self {
        match result {
            Ok(res) => Self {
                target,
                output: res.combined_output(),
                status: Some(res.status),
                succeeded: res.success(),
                duration,
            },
            Err(e) => Self::failed(target, &e, duration),
        }
    }

    /// Outcome for a node whose command could not be run
    pub fn failed(target: Target, error: &ExecError, duration: Duration) -> Self {
        Self {
            target,
            output: error.to_string(),
            status: None,
            succeeded: false,
            duration,
        }
    }
}
