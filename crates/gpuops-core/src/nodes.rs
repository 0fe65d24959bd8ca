//! Node capacity and scheduling status

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::Client;
use kube::api::{Api, ListParams, Patch, PatchParams};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ClusterSettings;
use crate::error::Result;

/// Field selector for pods that still hold their resources
pub(crate) const ACTIVE_PODS: &str = "status.phase!=Succeeded,status.phase!=Failed";

/// GPU accounting and status for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    /// `Ready` condition is `True`
    pub ready: bool,
    /// Not cordoned
    pub schedulable: bool,
    pub internal_ip: Option<String>,
    pub gpu_capacity: u64,
    pub gpu_allocatable: u64,
    /// GPUs requested by active pods bound to this node
    pub gpu_requested: u64,
}

impl NodeSummary {
    /// Allocatable GPUs not requested by any active pod
    #[must_use]
    pub fn gpu_free(&self) -> u64 {
        self.gpu_allocatable.saturating_sub(self.gpu_requested)
    }
}

/// Which nodes a cordon/uncordon call reached
#[derive(Debug, Clone, Default)]
pub struct PatchReport {
    pub patched: Vec<String>,
    pub failed: Vec<String>,
}

/// Integer count from a resource quantity; GPU quantities are whole numbers
pub(crate) fn quantity_count(quantity: &Quantity) -> u64 {
    let raw = quantity.0.trim();
    raw.parse::<u64>().unwrap_or_else(|_| {
        debug!(quantity = raw, "non-integer quantity counted as 0");
        0
    })
}

fn resource_count(map: Option<&BTreeMap<String, Quantity>>, resource: &str) -> u64 {
    map.and_then(|m| m.get(resource))
        .map_or(0, quantity_count)
}

/// Build the summary for one node, with nothing requested yet
#[must_use]
pub fn summarize_node(node: &Node, gpu_resource: &str) -> NodeSummary {
    let status = node.status.as_ref();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True");

    let internal_ip = status
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalIP"))
        .map(|a| a.address.clone());

    let schedulable = !node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);

    NodeSummary {
        name: node.metadata.name.clone().unwrap_or_default(),
        ready,
        schedulable,
        internal_ip,
        gpu_capacity: resource_count(status.and_then(|s| s.capacity.as_ref()), gpu_resource),
        gpu_allocatable: resource_count(status.and_then(|s| s.allocatable.as_ref()), gpu_resource),
        gpu_requested: 0,
    }
}

/// GPUs a pod asks for, summed over its containers
///
/// Extended resources may be given as limits only, in which case the limit
/// is the request.
#[must_use]
pub fn pod_gpu_request(pod: &Pod, gpu_resource: &str) -> u64 {
    pod.spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .filter_map(|c| c.resources.as_ref())
                .map(|r| {
                    let requested = resource_count(r.requests.as_ref(), gpu_resource);
                    if requested > 0 {
                        requested
                    } else {
                        resource_count(r.limits.as_ref(), gpu_resource)
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

/// Whether a pod still holds its node's resources
#[must_use]
pub fn is_active(pod: &Pod) -> bool {
    !matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded" | "Failed")
    )
}

/// GPU requests of active pods, keyed by node name
#[must_use]
pub fn requested_by_node(pods: &[Pod], gpu_resource: &str) -> HashMap<String, u64> {
    let mut requested = HashMap::new();
    for pod in pods.iter().filter(|p| is_active(p)) {
        let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.as_ref()) else {
            continue;
        };
        *requested.entry(node.clone()).or_insert(0) += pod_gpu_request(pod, gpu_resource);
    }
    requested
}

/// Merge patch flipping a node's schedulability
#[must_use]
pub fn schedulable_patch(schedulable: bool) -> serde_json::Value {
    json!({ "spec": { "unschedulable": !schedulable } })
}

/// List nodes with their GPU accounting, optionally only `only`
///
/// A failed pod listing is logged and leaves `gpu_requested` at zero; a
/// failed node listing is returned as an error.
///
/// # Errors
/// Returns `CoreError::Kube` if nodes cannot be listed.
#[instrument(skip(client, cluster))]
pub async fn list_nodes(
    client: &Client,
    cluster: &ClusterSettings,
    only: &[String],
) -> Result<Vec<NodeSummary>> {
    let nodes: Api<Node> = Api::all(client.clone());
    let node_list = nodes.list(&ListParams::default()).await?;

    let pods: Api<Pod> = Api::all(client.clone());
    let requested = match pods.list(&ListParams::default().fields(ACTIVE_PODS)).await {
        Ok(list) => requested_by_node(&list.items, &cluster.gpu_resource),
        Err(e) => {
            warn!(error = %e, "failed to list pods, GPU usage unknown");
            HashMap::new()
        }
    };

    let mut summaries: Vec<NodeSummary> = node_list
        .items
        .iter()
        .map(|node| {
            let mut summary = summarize_node(node, &cluster.gpu_resource);
            summary.gpu_requested = requested.get(&summary.name).copied().unwrap_or(0);
            summary
        })
        .filter(|s| only.is_empty() || only.contains(&s.name))
        .collect();

    for name in only {
        if !summaries.iter().any(|s| &s.name == name) {
            warn!(node = %name, "node not found");
        }
    }

    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = summaries.len(), "listed nodes");
    Ok(summaries)
}

/// Cordon (`schedulable = false`) or uncordon nodes
///
/// Each node is patched independently; failures are logged and the rest
/// still get patched.
#[instrument(skip(client))]
pub async fn set_schedulable(client: &Client, names: &[String], schedulable: bool) -> PatchReport {
    let nodes: Api<Node> = Api::all(client.clone());
    let patch = schedulable_patch(schedulable);

    patch_each(names, schedulable, |name| {
        let nodes = nodes.clone();
        let patch = patch.clone();
        async move {
            nodes
                .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
                .map(|_| ())
        }
    })
    .await
}

/// Apply `patch` to every node in order, recording which ones took
async fn patch_each<F, Fut, E>(names: &[String], schedulable: bool, mut patch: F) -> PatchReport
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    let mut report = PatchReport::default();

    for name in names {
        match patch(name.clone()).await {
            Ok(()) => {
                info!(node = %name, schedulable = schedulable, "node patched");
                report.patched.push(name.clone());
            }
            Err(e) => {
                error!(node = %name, error = %e, "failed to patch node");
                report.failed.push(name.clone());
            }
        }
    }

    report
}
