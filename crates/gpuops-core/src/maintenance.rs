//! Node maintenance over SSH: health probes, service restarts, reboots

use gpuops_exec::{FleetExecutor, HostOutcome, Target};
use tracing::instrument;

use crate::config::HealthSettings;
use crate::error::{CoreError, Result};

pub const DEFAULT_SERVICE: &str = "kubelet";
pub const REBOOT_COMMAND: &str = "sudo systemctl reboot";

/// Fleet executor plus the domain used to address nodes
#[derive(Debug, Clone)]
pub struct NodeFleet {
    executor: FleetExecutor,
    domain_suffix: String,
}

impl NodeFleet {
    pub fn new(executor: FleetExecutor, domain_suffix: impl Into<String>) -> Self {
        Self {
            executor,
            domain_suffix: domain_suffix.into(),
        }
    }

    /// Qualified targets for node names, order and duplicates preserved
    #[must_use]
    pub fn targets(&self, nodes: &[String]) -> Vec<Target> {
        Target::qualify_all(nodes.iter().map(String::as_str), &self.domain_suffix)
    }

    /// Run an arbitrary command on every node
    #[instrument(skip(self))]
    pub async fn run(&self, nodes: &[String], command: &str) -> Vec<HostOutcome> {
        self.executor.run(&self.targets(nodes), command).await
    }

    /// Network probe on every node
    pub async fn network_health(
        &self,
        nodes: &[String],
        health: &HealthSettings,
    ) -> Vec<HostOutcome> {
        self.run(nodes, &health.network_command).await
    }

    /// GPU probe on every node
    pub async fn gpu_health(&self, nodes: &[String], health: &HealthSettings) -> Vec<HostOutcome> {
        self.run(nodes, &health.gpu_command).await
    }

    /// Restart a systemd unit on every node
    ///
    /// # Errors
    /// Returns `CoreError::InvalidArgument` for a unit name that is not safe
    /// to interpolate into a shell command; nothing is run in that case.
    pub async fn restart_service(
        &self,
        nodes: &[String],
        service: &str,
    ) -> Result<Vec<HostOutcome>> {
        let command = restart_command(service)?;
        Ok(self.run(nodes, &command).await)
    }

    /// Reboot every node
    pub async fn reboot(&self, nodes: &[String]) -> Vec<HostOutcome> {
        self.run(nodes, REBOOT_COMMAND).await
    }
}

/// `systemctl restart` for a validated unit name
///
/// # Errors
/// Returns `CoreError::InvalidArgument` unless the name is made of
/// `[A-Za-z0-9@._-]`.
pub fn restart_command(service: &str) -> Result<String> {
    let valid = !service.is_empty()
        && service
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-'));

    if !valid {
        return Err(CoreError::InvalidArgument(format!(
            "bad service name: {service:?}"
        )));
    }

    Ok(format!("sudo systemctl restart {service}"))
}
