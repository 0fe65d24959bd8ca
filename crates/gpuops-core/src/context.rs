//! Per-invocation operation context
//!
//! Holds the resolved configuration and builds clients on demand. Required
//! keys for a client are checked when that client is requested, which is
//! always before the first network call of the action that needs it.

use std::sync::Arc;
use std::time::Duration;

use gpuops_client::JobClient;
use gpuops_exec::{FleetExecutor, SshFactory};
use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::config::{ClusterSettings, HealthSettings, SshSettings};
use crate::error::{CoreError, Result};
use crate::maintenance::NodeFleet;
use crate::provider::ProviderChain;
use crate::vc;

const DEFAULT_REST_TIMEOUT_SECS: u64 = 30;

/// Everything an operation needs, passed explicitly
#[derive(Debug)]
pub struct OpsContext {
    chain: ProviderChain,
    cluster: ClusterSettings,
    health: HealthSettings,
}

impl OpsContext {
    /// Resolve the always-available settings from `chain`
    #[must_use]
    pub fn new(chain: ProviderChain) -> Self {
        let cluster = ClusterSettings::resolve(&chain);
        let health = HealthSettings::resolve(&chain);
        Self {
            chain,
            cluster,
            health,
        }
    }

    #[must_use]
    pub fn cluster(&self) -> &ClusterSettings {
        &self.cluster
    }

    #[must_use]
    pub fn health(&self) -> &HealthSettings {
        &self.health
    }

    /// SSH settings; `ssh.user` must be configured
    ///
    /// # Errors
    /// Returns a configuration error if SSH settings are incomplete.
    pub fn ssh(&self) -> Result<SshSettings> {
        SshSettings::resolve(&self.chain)
    }

    /// Fleet for SSH actions, with the credential resolved once
    ///
    /// # Errors
    /// Returns a configuration error if SSH settings are incomplete, or
    /// `CoreError::Exec` if the key cannot be resolved.
    pub fn fleet(&self) -> Result<NodeFleet> {
        let ssh = self.ssh()?;
        let factory = SshFactory::new(&ssh.credential(), ssh.transport)?;

        let mut executor = FleetExecutor::new(Arc::new(factory));
        if let Some(cap) = ssh.max_parallel {
            executor = executor.with_max_parallel(cap);
        }
        if let Some(timeout) = ssh.command_timeout {
            executor = executor.with_timeout(timeout);
        }

        debug!(user = %ssh.user, transport = ?ssh.transport, "fleet ready");
        Ok(NodeFleet::new(executor, ssh.domain_suffix))
    }

    /// Client for the job-control endpoint at `rest.base_url`
    ///
    /// Requests give up after `rest.timeout_secs` (30 by default).
    ///
    /// # Errors
    /// Returns a configuration error if the URL is absent or invalid, or the
    /// timeout does not parse.
    pub fn job_client(&self) -> Result<JobClient> {
        let base_url = self.chain.require("rest.base_url")?;
        let timeout = self
            .chain
            .get_parsed::<u64>("rest.timeout_secs")?
            .unwrap_or(DEFAULT_REST_TIMEOUT_SECS);

        JobClient::with_timeout(&base_url, Duration::from_secs(timeout)).map_err(|e| {
            CoreError::InvalidConfig {
                key: "rest.base_url".to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Database URL from `database.url`
    ///
    /// # Errors
    /// Returns a configuration error if the URL is absent.
    pub fn database_url(&self) -> Result<String> {
        self.chain.require("database.url")
    }

    /// Connect to the scheduler database
    ///
    /// # Errors
    /// Returns a configuration error if `database.url` is absent, or
    /// `CoreError::Database` if the connection fails.
    pub async fn db_pool(&self) -> Result<PgPool> {
        let url = self.database_url()?;
        vc::connect(&url).await
    }

    /// Orchestrator client from `cluster.kubeconfig` or the default chain
    ///
    /// # Errors
    /// Returns `CoreError::KubeConfig` if no usable configuration is found.
    pub async fn kube_client(&self) -> Result<Client> {
        let config = match &self.cluster.kubeconfig {
            Some(path) => {
                info!(path = %path.display(), "using kubeconfig");
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| CoreError::KubeConfig(e.to_string()))?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| CoreError::KubeConfig(e.to_string()))?
            }
            None => kube::Config::infer()
                .await
                .map_err(|e| CoreError::KubeConfig(e.to_string()))?,
        };

        Ok(Client::try_from(config)?)
    }
}
