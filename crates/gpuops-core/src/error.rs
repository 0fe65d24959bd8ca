//! Core error types for gpuops-core

use thiserror::Error;

use gpuops_client::ClientError;
use gpuops_exec::ExecError;

/// Errors that can occur in cluster operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// A required key is absent from every configuration source
    #[error("missing configuration key `{key}` (looked in: {tried})")]
    MissingConfig {
        /// Dotted key, e.g. `ssh.user`
        key: String,
        /// Sources consulted, in order
        tried: String,
    },

    /// A configuration value could not be parsed
    #[error("invalid configuration for `{key}`: {message}")]
    InvalidConfig {
        /// Dotted key or file path
        key: String,
        /// What was wrong with it
        message: String,
    },

    /// Kubeconfig could not be loaded
    #[error("kubeconfig error: {0}")]
    KubeConfig(String),

    /// Orchestrator API call failed
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Job-control endpoint call failed
    #[error("job control error: {0}")]
    JobControl(#[from] ClientError),

    /// SSH setup failed
    #[error("remote execution error: {0}")]
    Exec(#[from] ExecError),

    /// Operator input rejected
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CoreError {
    /// Whether this error must abort before any network call
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CoreError::MissingConfig { .. } | CoreError::InvalidConfig { .. }
        )
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
