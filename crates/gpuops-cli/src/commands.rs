//! Action routing and operator-facing reporting
//!
//! Each action maps to one operation. Operation failures are logged and the
//! action ends; only configuration errors escape `dispatch`.

use clap::ValueEnum;
use tracing::{error, info, warn};

use gpuops_core::nodes::{self, NodeSummary};
use gpuops_core::placement::{self, JobPlacement, PlacementFilter};
use gpuops_core::{CoreError, OpsContext, vc};
use gpuops_exec::HostOutcome;

/// What to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Node readiness and schedulability
    Nodes,
    /// GPU capacity, allocation and free count per node
    Capacity,
    /// Mark nodes unschedulable
    Cordon,
    /// Mark nodes schedulable
    Uncordon,
    /// Job pods per node or per job
    Placement,
    /// Jobs belonging to --user
    UserJobs,
    /// Pause the --jobs
    Pause,
    /// Resume the --jobs
    Resume,
    /// Scheduler status of the --jobs
    Status,
    /// Virtual cluster capacity and quota
    VcQuota,
    /// Network probe on --nodes
    NetHealth,
    /// GPU probe on --nodes
    GpuHealth,
    /// Restart --service on --nodes
    Restart,
    /// Reboot --nodes
    Reboot,
    /// Run --command on --nodes
    Exec,
}

impl Action {
    fn name(self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default()
    }
}

/// Operator arguments shared by all actions
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub nodes: Vec<String>,
    pub jobs: Vec<String>,
    pub user: Option<String>,
    pub vcs: Vec<String>,
    pub service: String,
    pub command: Option<String>,
}

/// Run one action
///
/// # Errors
/// Returns configuration errors only; every other failure is logged.
pub async fn dispatch(ctx: &OpsContext, action: Action, req: &Request) -> Result<(), CoreError> {
    let result = match action {
        Action::Nodes => show_nodes(ctx, req).await,
        Action::Capacity => show_capacity(ctx, req).await,
        Action::Cordon => set_schedulable(ctx, req, false).await,
        Action::Uncordon => set_schedulable(ctx, req, true).await,
        Action::Placement => show_placement(ctx, req).await,
        Action::UserJobs => show_user_jobs(ctx, req).await,
        Action::Pause => pause_jobs(ctx, req).await,
        Action::Resume => resume_jobs(ctx, req).await,
        Action::Status => job_status(ctx, req).await,
        Action::VcQuota => show_vc_quota(ctx, req).await,
        Action::NetHealth => fleet_action(ctx, req, FleetOp::NetHealth).await,
        Action::GpuHealth => fleet_action(ctx, req, FleetOp::GpuHealth).await,
        Action::Restart => fleet_action(ctx, req, FleetOp::Restart(&req.service)).await,
        Action::Reboot => fleet_action(ctx, req, FleetOp::Reboot).await,
        Action::Exec => match req.command.as_deref().map(str::trim) {
            Some(command) if !command.is_empty() => {
                fleet_action(ctx, req, FleetOp::Exec(command)).await
            }
            _ => {
                error!(action = "exec", "--command is required");
                Ok(())
            }
        },
    };

    match result {
        Err(e) if e.is_config() => Err(e),
        Err(e) => {
            error!(action = %action.name(), error = %e, "action failed");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Log and skip when a required argument is missing
fn require_list(action: &str, flag: &str, values: &[String]) -> bool {
    if values.is_empty() {
        error!(action = action, "{flag} is required");
        return false;
    }
    true
}

async fn show_nodes(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    let client = ctx.kube_client().await?;
    let summaries = nodes::list_nodes(&client, ctx.cluster(), &req.nodes).await?;

    for n in &summaries {
        info!(
            node = %n.name,
            ready = n.ready,
            schedulable = n.schedulable,
            ip = n.internal_ip.as_deref().unwrap_or("-"),
            "node"
        );
    }

    let not_ready = summaries.iter().filter(|n| !n.ready).count();
    let cordoned = summaries.iter().filter(|n| !n.schedulable).count();
    info!(
        total = summaries.len(),
        not_ready = not_ready,
        cordoned = cordoned,
        "nodes listed"
    );
    Ok(())
}

fn log_capacity(n: &NodeSummary) {
    info!(
        node = %n.name,
        capacity = n.gpu_capacity,
        allocatable = n.gpu_allocatable,
        requested = n.gpu_requested,
        free = n.gpu_free(),
        schedulable = n.schedulable,
        "gpu capacity"
    );
}

async fn show_capacity(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    let client = ctx.kube_client().await?;
    let summaries = nodes::list_nodes(&client, ctx.cluster(), &req.nodes).await?;

    summaries.iter().for_each(log_capacity);

    let sum = |f: fn(&NodeSummary) -> u64| summaries.iter().map(f).sum::<u64>();
    info!(
        nodes = summaries.len(),
        capacity = sum(|n| n.gpu_capacity),
        allocatable = sum(|n| n.gpu_allocatable),
        requested = sum(|n| n.gpu_requested),
        free = sum(NodeSummary::gpu_free),
        "cluster gpu totals"
    );
    Ok(())
}

async fn set_schedulable(
    ctx: &OpsContext,
    req: &Request,
    schedulable: bool,
) -> Result<(), CoreError> {
    let action = if schedulable { "uncordon" } else { "cordon" };
    if !require_list(action, "--nodes", &req.nodes) {
        return Ok(());
    }

    let client = ctx.kube_client().await?;
    let report = nodes::set_schedulable(&client, &req.nodes, schedulable).await;

    info!(
        action = action,
        patched = report.patched.len(),
        failed = ?report.failed,
        "done"
    );
    Ok(())
}

fn log_placements(placements: &[JobPlacement]) {
    for p in placements {
        info!(
            job = %p.job,
            user = p.user.as_deref().unwrap_or("-"),
            gpus = p.gpus,
            pods = p.pods.len(),
            nodes = %p.nodes.join(","),
            "job placement"
        );
    }
    info!(jobs = placements.len(), "placement listed");
}

async fn show_placement(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    let filter = PlacementFilter {
        nodes: req.nodes.clone(),
        user: req.user.clone(),
        jobs: req.jobs.clone(),
    };

    let client = ctx.kube_client().await?;
    let placements = placement::job_placement(&client, ctx.cluster(), &filter).await?;
    log_placements(&placements);
    Ok(())
}

async fn show_user_jobs(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    let Some(user) = req.user.clone() else {
        error!(action = "user-jobs", "--user is required");
        return Ok(());
    };

    let filter = PlacementFilter {
        user: Some(user),
        ..Default::default()
    };

    let client = ctx.kube_client().await?;
    let placements = placement::job_placement(&client, ctx.cluster(), &filter).await?;
    log_placements(&placements);
    Ok(())
}

async fn pause_jobs(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    if !require_list("pause", "--jobs", &req.jobs) {
        return Ok(());
    }
    let client = ctx.job_client()?;
    let resp = client.pause_jobs(&req.jobs).await?;

    info!(
        paused = ?resp.succeeded,
        failed = ?resp.failed,
        message = resp.message.as_deref().unwrap_or(""),
        "pause requested"
    );
    Ok(())
}

async fn resume_jobs(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    if !require_list("resume", "--jobs", &req.jobs) {
        return Ok(());
    }
    let client = ctx.job_client()?;
    let resp = client.resume_jobs(&req.jobs).await?;

    info!(
        resumed = ?resp.succeeded,
        failed = ?resp.failed,
        message = resp.message.as_deref().unwrap_or(""),
        "resume requested"
    );
    Ok(())
}

async fn job_status(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    if !require_list("status", "--jobs", &req.jobs) {
        return Ok(());
    }
    let client = ctx.job_client()?;

    // one lookup per job; a failed lookup does not stop the rest
    for id in &req.jobs {
        match client.job_status(id).await {
            Ok(status) => info!(
                job = %status.id,
                state = %status.state,
                user = status.user.as_deref().unwrap_or("-"),
                vc = status.vc.as_deref().unwrap_or("-"),
                nodes = %status.nodes.join(","),
                submitted = ?status.submitted_at,
                "job status"
            ),
            Err(e) => error!(job = %id, error = %e, "status lookup failed"),
        }
    }
    Ok(())
}

async fn show_vc_quota(ctx: &OpsContext, req: &Request) -> Result<(), CoreError> {
    let pool = ctx.db_pool().await?;
    let quotas = vc::vc_quotas(&pool, &req.vcs).await?;

    for q in &quotas {
        let gpu = |r: &Option<vc::Resources>| r.as_ref().and_then(|r| r.gpu);
        info!(
            vc = %q.name,
            gpu_capacity = ?gpu(&q.capacity),
            gpu_quota = ?gpu(&q.quota),
            capacity = ?q.capacity,
            quota = ?q.quota,
            "vc quota"
        );
    }
    info!(vcs = quotas.len(), "vc quotas listed");
    Ok(())
}

/// Actions carried out over SSH on `--nodes`
#[derive(Debug, Clone, Copy)]
enum FleetOp<'a> {
    NetHealth,
    GpuHealth,
    Restart(&'a str),
    Reboot,
    Exec(&'a str),
}

impl FleetOp<'_> {
    fn name(self) -> &'static str {
        match self {
            FleetOp::NetHealth => "net-health",
            FleetOp::GpuHealth => "gpu-health",
            FleetOp::Restart(_) => "restart",
            FleetOp::Reboot => "reboot",
            FleetOp::Exec(_) => "exec",
        }
    }
}

async fn fleet_action(ctx: &OpsContext, req: &Request, op: FleetOp<'_>) -> Result<(), CoreError> {
    let name = op.name();
    if !require_list(name, "--nodes", &req.nodes) {
        return Ok(());
    }

    let fleet = ctx.fleet()?;

    let outcomes = match op {
        FleetOp::NetHealth => fleet.network_health(&req.nodes, ctx.health()).await,
        FleetOp::GpuHealth => fleet.gpu_health(&req.nodes, ctx.health()).await,
        FleetOp::Restart(service) => fleet.restart_service(&req.nodes, service).await?,
        FleetOp::Reboot => fleet.reboot(&req.nodes).await,
        FleetOp::Exec(command) => fleet.run(&req.nodes, command).await,
    };

    report_outcomes(name, &outcomes);
    Ok(())
}

fn report_outcomes(action: &str, outcomes: &[HostOutcome]) {
    for o in outcomes {
        let output = o.output.trim_end();
        if o.succeeded {
            info!(host = %o.target, output = %output, "{action}");
        } else {
            warn!(host = %o.target, status = ?o.status, output = %output, "{action} failed");
        }
    }

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.succeeded)
        .map(|o| o.target.id.as_str())
        .collect();
    info!(
        action = action,
        hosts = outcomes.len(),
        failed = ?failed,
        "batch complete"
    );
}

#[cfg(test)]
mod tests {
    use gpuops_core::{MapProvider, ProviderChain};

    use super::*;

    fn ctx() -> OpsContext {
        OpsContext::new(ProviderChain::new().with(MapProvider::new("test")))
    }

    #[test]
    fn test_action_names() {
        assert_eq!(Action::VcQuota.name(), "vc-quota");
        assert_eq!(Action::NetHealth.name(), "net-health");
        assert_eq!(Action::from_str("user-jobs", false).unwrap(), Action::UserJobs);
    }

    #[tokio::test]
    async fn test_missing_config_escapes_dispatch() {
        let req = Request {
            jobs: vec!["job-1".into()],
            ..Default::default()
        };

        let err = dispatch(&ctx(), Action::Pause, &req).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingConfig { ref key, .. } if key == "rest.base_url"));
    }

    #[tokio::test]
    async fn test_missing_arguments_are_logged_not_raised() {
        let req = Request::default();

        // none of these reach a config lookup or the network
        for action in [Action::Cordon, Action::Pause, Action::Status, Action::Reboot, Action::UserJobs] {
            assert!(dispatch(&ctx(), action, &req).await.is_ok(), "{action:?}");
        }
    }

    #[test]
    fn test_fleet_op_names_match_actions() {
        let pairs = [
            (FleetOp::NetHealth, Action::NetHealth),
            (FleetOp::GpuHealth, Action::GpuHealth),
            (FleetOp::Restart("kubelet"), Action::Restart),
            (FleetOp::Reboot, Action::Reboot),
            (FleetOp::Exec("uptime"), Action::Exec),
        ];
        for (op, action) in pairs {
            assert_eq!(op.name(), action.name());
        }
    }

    #[tokio::test]
    async fn test_exec_without_command_is_skipped_before_config() {
        // no ssh.user configured, so reaching the fleet would be a config error
        let req = Request {
            nodes: vec!["gpu-1".into()],
            command: Some("   ".into()),
            ..Default::default()
        };
        assert!(dispatch(&ctx(), Action::Exec, &req).await.is_ok());

        let req = Request {
            command: Some("uptime".into()),
            ..req
        };
        assert!(dispatch(&ctx(), Action::Exec, &req).await.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_fleet_action_needs_ssh_user() {
        let req = Request {
            nodes: vec!["gpu-1".into()],
            ..Default::default()
        };

        let err = dispatch(&ctx(), Action::Reboot, &req).await.unwrap_err();
        assert!(err.is_config());
    }
}
