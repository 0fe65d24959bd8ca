//! Response types of the job-control endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Answer to a pause or resume request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionResponse {
    /// Jobs the scheduler acted on
    #[serde(default)]
    pub succeeded: Vec<String>,
    /// Jobs the scheduler refused or could not find
    #[serde(default)]
    pub failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobActionResponse {
    /// Whether every requested job was acted on
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Scheduler view of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: String,
    /// Scheduler state, e.g. `RUNNING`, `PAUSED`, `WAITING`
    #[serde(alias = "status")]
    pub state: String,
    #[serde(default)]
    pub user: Option<String>,
    /// Virtual cluster the job was submitted to
    #[serde(default)]
    pub vc: Option<String>,
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}
