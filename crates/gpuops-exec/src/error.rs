//! Error types for gpuops-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during remote execution
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to remote host
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// SSH key error
    #[error("SSH key error: {0}")]
    SshKeyError(String),

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),

    /// Connection not established
    #[error("not connected")]
    NotConnected,

    /// Fleet task ended without producing a result
    #[error("task aborted: {0}")]
    TaskAborted(String),
}

impl ExecError {
    /// Whether the command never reached the remote shell
    #[must_use]
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ExecError::ConnectionFailed(_)
                | ExecError::AuthenticationFailed(_)
                | ExecError::SshKeyError(_)
                | ExecError::SpawnError(_)
                | ExecError::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_level_classification() {
        assert!(ExecError::ConnectionFailed("refused".into()).is_connection_level());
        assert!(ExecError::AuthenticationFailed("denied".into()).is_connection_level());
        assert!(!ExecError::IoError("broken pipe".into()).is_connection_level());
        assert!(
            !ExecError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .is_connection_level()
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = ExecError::Timeout {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "command timed out after 5s");
    }
}
