//! Job placement: which job pods run where

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::Client;
use kube::api::{Api, ListParams};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::ClusterSettings;
use crate::error::Result;
use crate::nodes::{ACTIVE_PODS, pod_gpu_request};

/// One job pod, reduced to what placement needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSummary {
    pub namespace: String,
    pub name: String,
    pub job: String,
    pub user: Option<String>,
    /// `None` while unscheduled
    pub node: Option<String>,
    pub phase: String,
    pub gpus: u64,
}

/// Where one job's pods landed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPlacement {
    pub job: String,
    pub user: Option<String>,
    /// Sorted, without duplicates
    pub nodes: Vec<String>,
    pub pods: Vec<String>,
    pub gpus: u64,
}

/// Restrictions on which pods are reported; empty fields match everything
#[derive(Debug, Clone, Default)]
pub struct PlacementFilter {
    pub nodes: Vec<String>,
    pub user: Option<String>,
    pub jobs: Vec<String>,
}

impl PlacementFilter {
    #[must_use]
    pub fn matches(&self, pod: &PodSummary) -> bool {
        let on_node = self.nodes.is_empty()
            || pod
                .node
                .as_ref()
                .is_some_and(|n| self.nodes.contains(n));
        let by_user = self
            .user
            .as_ref()
            .is_none_or(|u| pod.user.as_ref() == Some(u));
        let of_job = self.jobs.is_empty() || self.jobs.contains(&pod.job);

        on_node && by_user && of_job
    }

    /// Label selector narrowing the server-side listing
    #[must_use]
    pub fn label_selector(&self, cluster: &ClusterSettings) -> String {
        match &self.user {
            Some(user) => format!("{},{}={}", cluster.job_label, cluster.user_label, user),
            None => cluster.job_label.clone(),
        }
    }
}

/// Reduce a pod; pods without the job label are not job pods
#[must_use]
pub fn summarize_pod(pod: &Pod, cluster: &ClusterSettings) -> Option<PodSummary> {
    let labels = pod.metadata.labels.as_ref()?;
    let job = labels.get(&cluster.job_label)?.clone();

    Some(PodSummary {
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        name: pod.metadata.name.clone().unwrap_or_default(),
        job,
        user: labels.get(&cluster.user_label).cloned(),
        node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        phase: pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        gpus: pod_gpu_request(pod, &cluster.gpu_resource),
    })
}

/// Group pods by job, ordered by job name
#[must_use]
pub fn group_by_job(pods: Vec<PodSummary>) -> Vec<JobPlacement> {
    let mut jobs: BTreeMap<String, JobPlacement> = BTreeMap::new();

    for pod in pods {
        let entry = jobs.entry(pod.job.clone()).or_insert_with(|| JobPlacement {
            job: pod.job.clone(),
            user: pod.user.clone(),
            nodes: Vec::new(),
            pods: Vec::new(),
            gpus: 0,
        });

        if let Some(node) = pod.node {
            entry.nodes.push(node);
        }
        entry.pods.push(pod.name);
        entry.gpus += pod.gpus;
    }

    jobs.into_values()
        .map(|mut placement| {
            placement.nodes.sort();
            placement.nodes.dedup();
            placement
        })
        .collect()
}

/// Active job pods matching `filter`, grouped by job
///
/// # Errors
/// Returns `CoreError::Kube` if pods cannot be listed.
#[instrument(skip(client, cluster))]
pub async fn job_placement(
    client: &Client,
    cluster: &ClusterSettings,
    filter: &PlacementFilter,
) -> Result<Vec<JobPlacement>> {
    let pods: Api<Pod> = match &cluster.namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    let params = ListParams::default()
        .labels(&filter.label_selector(cluster))
        .fields(ACTIVE_PODS);
    let list = pods.list(&params).await?;

    let matching: Vec<PodSummary> = list
        .items
        .iter()
        .filter_map(|pod| summarize_pod(pod, cluster))
        .filter(|pod| filter.matches(pod))
        .collect();

    debug!(pods = matching.len(), "matched job pods");
    Ok(group_by_job(matching))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pod_summary(job: &str, user: &str, node: Option<&str>, name: &str) -> PodSummary {
        PodSummary {
            namespace: "default".to_string(),
            name: name.to_string(),
            job: job.to_string(),
            user: Some(user.to_string()),
            node: node.map(String::from),
            phase: "Running".to_string(),
            gpus: 4,
        }
    }

    #[test]
    fn test_summarize_pod() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {
                "name": "bert-large-worker-0",
                "namespace": "jobs",
                "labels": { "jobName": "bert-large", "userName": "alice" }
            },
            "spec": {
                "nodeName": "gpu-007",
                "containers": [ { "name": "main", "resources": { "limits": { "nvidia.com/gpu": "8" } } } ]
            },
            "status": { "phase": "Running" }
        }))
        .unwrap();

        let summary = summarize_pod(&pod, &ClusterSettings::default()).unwrap();
        assert_eq!(summary.job, "bert-large");
        assert_eq!(summary.user.as_deref(), Some("alice"));
        assert_eq!(summary.node.as_deref(), Some("gpu-007"));
        assert_eq!(summary.gpus, 8);
    }

    #[test]
    fn test_pod_without_job_label_is_skipped() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": { "name": "coredns", "labels": { "k8s-app": "kube-dns" } },
            "spec": { "containers": [ { "name": "coredns" } ] }
        }))
        .unwrap();

        assert!(summarize_pod(&pod, &ClusterSettings::default()).is_none());
    }

    #[test]
    fn test_group_by_job() {
        let placements = group_by_job(vec![
            pod_summary("resnet", "bob", Some("gpu-002"), "resnet-1"),
            pod_summary("bert", "alice", Some("gpu-009"), "bert-0"),
            pod_summary("bert", "alice", Some("gpu-001"), "bert-1"),
            pod_summary("bert", "alice", Some("gpu-001"), "bert-2"),
            pod_summary("bert", "alice", None, "bert-3"),
        ]);

        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].job, "bert");
        assert_eq!(placements[0].nodes, ["gpu-001", "gpu-009"]);
        assert_eq!(placements[0].pods.len(), 4);
        assert_eq!(placements[0].gpus, 16);
        assert_eq!(placements[1].job, "resnet");
    }

    #[test]
    fn test_filter() {
        let pod = pod_summary("bert", "alice", Some("gpu-001"), "bert-0");

        assert!(PlacementFilter::default().matches(&pod));
        assert!(
            PlacementFilter {
                nodes: vec!["gpu-001".into()],
                ..Default::default()
            }
            .matches(&pod)
        );
        assert!(
            !PlacementFilter {
                user: Some("bob".into()),
                ..Default::default()
            }
            .matches(&pod)
        );
        assert!(
            !PlacementFilter {
                jobs: vec!["resnet".into()],
                ..Default::default()
            }
            .matches(&pod)
        );
    }

    #[test]
    fn test_unscheduled_pod_fails_node_filter() {
        let pod = pod_summary("bert", "alice", None, "bert-0");
        let filter = PlacementFilter {
            nodes: vec!["gpu-001".into()],
            ..Default::default()
        };
        assert!(!filter.matches(&pod));
    }

    #[test]
    fn test_label_selector() {
        let cluster = ClusterSettings::default();
        assert_eq!(PlacementFilter::default().label_selector(&cluster), "jobName");

        let filter = PlacementFilter {
            user: Some("alice".into()),
            ..Default::default()
        };
        assert_eq!(filter.label_selector(&cluster), "jobName,userName=alice");
    }
}
