//! Fleet executor: one command, many nodes
//!
//! Every target gets its own task and its own session. Tasks are launched
//! together and joined together; the batch returns once all of them have
//! finished, with outcomes in the order the targets were given.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ExecError;
use crate::factory::ExecutorFactory;
use crate::result::HostOutcome;
use crate::target::Target;

/// Unbounded batches above this size get a warning
const LARGE_BATCH: usize = 64;

/// Runs a command on a list of nodes concurrently
#[derive(Clone)]
pub struct FleetExecutor {
    factory: Arc<dyn ExecutorFactory>,
    max_parallel: Option<usize>,
    command_timeout: Option<Duration>,
}

impl std::fmt::Debug for FleetExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetExecutor")
            .field("max_parallel", &self.max_parallel)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl FleetExecutor {
    /// Executor with one task per node and no timeout
    pub fn new(factory: Arc<dyn ExecutorFactory>) -> Self {
        Self {
            factory,
            max_parallel: None,
            command_timeout: None,
        }
    }

    /// Cap the number of simultaneous sessions; `0` means one per node
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = (max_parallel > 0).then_some(max_parallel);
        self
    }

    /// Give up on a node's command after `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Configured session cap, if any
    #[must_use]
    pub fn max_parallel(&self) -> Option<usize> {
        self.max_parallel
    }

    /// Run `command` on every target
    ///
    /// Returns exactly one outcome per target, positionally aligned with
    /// `targets`. Per-node failures (unreachable host, rejected key, non-zero
    /// exit, panicked task) are recorded in that node's outcome and never fail
    /// the batch. An empty target list returns immediately without spawning.
    #[instrument(skip(self, targets), fields(hosts = targets.len()))]
    pub async fn run(&self, targets: &[Target], command: &str) -> Vec<HostOutcome> {
        if targets.is_empty() {
            debug!("empty batch, nothing to run");
            return Vec::new();
        }

        let limit = self
            .max_parallel
            .map_or(targets.len(), |cap| cap.min(targets.len()));

        if self.max_parallel.is_none() && targets.len() > LARGE_BATCH {
            warn!(
                hosts = targets.len(),
                "unbounded fan-out over a large batch; consider ssh.max_parallel"
            );
        }

        info!(hosts = targets.len(), parallel = limit, command = %command, "starting batch");

        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(limit));
        let command: Arc<str> = Arc::from(command);

        let mut tasks = JoinSet::new();
        let mut slot_of = HashMap::with_capacity(targets.len());

        for (index, target) in targets.iter().enumerate() {
            let factory = Arc::clone(&self.factory);
            let permits = Arc::clone(&permits);
            let command = Arc::clone(&command);
            let target = target.clone();
            let timeout = self.command_timeout;

            let handle = tasks.spawn(async move {
                // the semaphore is never closed, so acquire cannot fail
                let _permit = permits.acquire_owned().await.ok();
                run_on_target(factory.as_ref(), target, &command, timeout).await
            });
            slot_of.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<HostOutcome>> = (0..targets.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    if let Some(&index) = slot_of.get(&id) {
                        slots[index] = Some(outcome);
                    }
                }
                Err(join_err) => {
                    let Some(&index) = slot_of.get(&join_err.id()) else {
                        continue;
                    };
                    error!(host = %targets[index], error = %join_err, "fleet task aborted");
                    slots[index] = Some(HostOutcome::failed(
                        targets[index].clone(),
                        &ExecError::TaskAborted(join_err.to_string()),
                        Duration::ZERO,
                    ));
                }
            }
        }

        let outcomes: Vec<HostOutcome> = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    HostOutcome::failed(
                        target.clone(),
                        &ExecError::TaskAborted("no result recorded".to_string()),
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        let failed = outcomes.iter().filter(|o| !o.succeeded).count();
        info!(
            hosts = outcomes.len(),
            failed = failed,
            elapsed = ?started.elapsed(),
            "batch finished"
        );

        outcomes
    }
}

async fn run_on_target(
    factory: &dyn ExecutorFactory,
    target: Target,
    command: &str,
    timeout: Option<Duration>,
) -> HostOutcome {
    let start = Instant::now();

    let result = match factory.create_executor(&target) {
        Ok(executor) => {
            debug!(host = %target, transport = executor.executor_type(), "running command");
            match timeout {
                Some(limit) => executor.run_with_timeout(command, limit).await,
                None => executor.run(command).await,
            }
        }
        Err(e) => Err(e),
    };

    match &result {
        Err(e) if e.is_connection_level() => {
            warn!(host = %target, error = %e, "node unreachable");
        }
        Err(e) => warn!(host = %target, error = %e, "command did not complete"),
        Ok(res) if !res.success() => {
            warn!(host = %target, status = res.status, "command exited non-zero");
        }
        Ok(_) => debug!(host = %target, duration = ?start.elapsed(), "node finished"),
    }

    HostOutcome::from_result(target, result, start.elapsed())
}

/// Plain text per node, in batch order
///
/// This is the operator-facing view: exit status is dropped and an
/// invocation failure shows up as its error message.
#[must_use]
pub fn outputs(outcomes: &[HostOutcome]) -> Vec<String> {
    outcomes.iter().map(|o| o.output.clone()).collect()
}
