//! Per-node executor construction from one shared credential

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExecError;
use crate::keys::{KeySource, ResolvedKey};
use crate::openssh::OpenSshExecutor;
use crate::result::ConnectionInfo;
use crate::ssh::SshExecutor;
use crate::target::Target;
use crate::traits::RemoteExecutor;

/// Builds a fresh executor for each node in a batch
///
/// Allows tests to substitute an in-memory transport for SSH.
pub trait ExecutorFactory: Send + Sync {
    /// Create an executor bound to `target`
    ///
    /// # Errors
    /// Returns an error if no executor can be built for this target.
    fn create_executor(&self, target: &Target) -> Result<Box<dyn RemoteExecutor>, ExecError>;
}

/// Which SSH implementation carries the commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// In-process client (russh)
    Native,
    /// The system `ssh` binary
    #[default]
    OpenSsh,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "russh" => Ok(Self::Native),
            "openssh" | "ssh" => Ok(Self::OpenSsh),
            other => Err(format!("unknown ssh transport: {other}")),
        }
    }
}

/// Login identity shared by every node in a batch
#[derive(Debug, Clone)]
pub struct Credential {
    /// Login name
    pub user: String,
    /// Where the private key comes from
    pub key: KeySource,
    /// SSH port
    pub port: u16,
}

impl Credential {
    /// Credential on the standard SSH port
    pub fn new(user: impl Into<String>, key: KeySource) -> Self {
        Self {
            user: user.into(),
            key,
            port: 22,
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Factory producing SSH executors that all share one resolved key
#[derive(Debug, Clone)]
pub struct SshFactory {
    user: String,
    port: u16,
    key: Arc<ResolvedKey>,
    transport: Transport,
}

impl SshFactory {
    /// Resolve the credential once for the whole batch
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if key resolution fails
    pub fn new(credential: &Credential, transport: Transport) -> Result<Self, ExecError> {
        let key = credential
            .key
            .resolve()
            .map_err(|e| ExecError::SshKeyError(e.to_string()))?;

        debug!(user = %credential.user, transport = ?transport, "resolved SSH credential");

        Ok(Self {
            user: credential.user.clone(),
            port: credential.port,
            key: Arc::new(key),
            transport,
        })
    }

    fn connection_info(&self, target: &Target) -> ConnectionInfo {
        ConnectionInfo::new(&target.address, &self.user).with_port(self.port)
    }
}

impl ExecutorFactory for SshFactory {
    fn create_executor(&self, target: &Target) -> Result<Box<dyn RemoteExecutor>, ExecError> {
        let conn_info = self.connection_info(target);
        let key = Arc::clone(&self.key);

        Ok(match self.transport {
            Transport::Native => Box::new(SshExecutor::new(conn_info, key)),
            Transport::OpenSsh => Box::new(OpenSshExecutor::new(conn_info, key)),
        })
    }
}
