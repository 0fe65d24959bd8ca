//! Remote executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// A shell session bound to one node
///
/// Implementations capture stdout and stderr separately and report the exit
/// status; turning that into an operator-facing outcome is left to the caller.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command and wait for it to exit
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run a command, giving up after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short transport name for logging
    fn executor_type(&self) -> &'static str;
}
