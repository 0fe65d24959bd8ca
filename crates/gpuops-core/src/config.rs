//! Typed settings resolved from the provider chain

use std::path::PathBuf;
use std::time::Duration;

use gpuops_exec::{Credential, KeySource, Transport};

use crate::error::{CoreError, Result};
use crate::provider::ProviderChain;

pub const DEFAULT_GPU_RESOURCE: &str = "nvidia.com/gpu";
pub const DEFAULT_JOB_LABEL: &str = "jobName";
pub const DEFAULT_USER_LABEL: &str = "userName";
pub const DEFAULT_NETWORK_COMMAND: &str = "ibstatus";
pub const DEFAULT_GPU_COMMAND: &str =
    "nvidia-smi --query-gpu=index,name,temperature.gpu,utilization.gpu --format=csv,noheader";

/// SSH access to the nodes
#[derive(Debug, Clone)]
pub struct SshSettings {
    /// Login name
    pub user: String,
    /// Where the private key comes from
    pub key: KeySource,
    /// Suffix turning a node name into a resolvable address
    pub domain_suffix: String,
    pub port: u16,
    pub transport: Transport,
    /// Session cap per batch, `None` for one session per node
    pub max_parallel: Option<usize>,
    /// Per-node command timeout, `None` to wait forever
    pub command_timeout: Option<Duration>,
}

impl SshSettings {
    /// Resolve from the chain
    ///
    /// `ssh.user` is required. The key comes from `ssh.key_path`, then
    /// `ssh.key_env` (name of a variable holding a base64 key), then the SSH
    /// agent.
    ///
    /// # Errors
    /// Returns a configuration error if `ssh.user` is absent or a value does
    /// not parse.
    pub fn resolve(chain: &ProviderChain) -> Result<Self> {
        let user = chain.require("ssh.user")?;

        let key = if let Some(path) = chain.get("ssh.key_path") {
            KeySource::Path(expand_home(&path))
        } else if let Some(var) = chain.get("ssh.key_env") {
            KeySource::Env(var)
        } else {
            KeySource::Agent
        };

        let transport = chain
            .get("ssh.transport")
            .map(|raw| {
                raw.parse::<Transport>()
                    .map_err(|message| CoreError::InvalidConfig {
                        key: "ssh.transport".to_string(),
                        message,
                    })
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            user,
            key,
            domain_suffix: chain.get_or("ssh.domain_suffix", ""),
            port: chain.get_parsed("ssh.port")?.unwrap_or(22),
            transport,
            max_parallel: chain
                .get_parsed::<usize>("ssh.max_parallel")?
                .filter(|n| *n > 0),
            command_timeout: chain
                .get_parsed::<u64>("ssh.command_timeout_secs")?
                .filter(|n| *n > 0)
                .map(Duration::from_secs),
        })
    }

    /// Credential shared by every node of a batch
    #[must_use]
    pub fn credential(&self) -> Credential {
        Credential::new(&self.user, self.key.clone()).with_port(self.port)
    }
}

/// How the orchestrator is reached and labels its objects
#[derive(Debug, Clone)]
pub struct ClusterSettings {
    /// Explicit kubeconfig; otherwise the client's default inference
    pub kubeconfig: Option<PathBuf>,
    /// Restrict pod queries to one namespace
    pub namespace: Option<String>,
    /// Extended resource name counted as GPUs
    pub gpu_resource: String,
    /// Pod label carrying the job name
    pub job_label: String,
    /// Pod label carrying the submitting user
    pub user_label: String,
}

impl ClusterSettings {
    /// Resolve from the chain; every key has a default
    #[must_use]
    pub fn resolve(chain: &ProviderChain) -> Self {
        Self {
            kubeconfig: chain.get("cluster.kubeconfig").map(|p| expand_home(&p)),
            namespace: chain.get("cluster.namespace"),
            gpu_resource: chain.get_or("cluster.gpu_resource", DEFAULT_GPU_RESOURCE),
            job_label: chain.get_or("cluster.job_label", DEFAULT_JOB_LABEL),
            user_label: chain.get_or("cluster.user_label", DEFAULT_USER_LABEL),
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self::resolve(&ProviderChain::new())
    }
}

/// Probe commands for the health actions
#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub network_command: String,
    pub gpu_command: String,
}

impl HealthSettings {
    #[must_use]
    pub fn resolve(chain: &ProviderChain) -> Self {
        Self {
            network_command: chain.get_or("health.network_command", DEFAULT_NETWORK_COMMAND),
            gpu_command: chain.get_or("health.gpu_command", DEFAULT_GPU_COMMAND),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(path), |h| h.join(rest)),
        None => PathBuf::from(path),
    }
}
