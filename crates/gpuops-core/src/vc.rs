//! Virtual-cluster quotas stored in the scheduler database

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, instrument, warn};

use crate::error::Result;

const ALL_VCS: &str = "SELECT name, metadata::text FROM virtual_clusters ORDER BY name";
const SOME_VCS: &str =
    "SELECT name, metadata::text FROM virtual_clusters WHERE name = ANY($1) ORDER BY name";

/// Resource amounts as stored in VC metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub gpu: Option<u64>,
    #[serde(default)]
    pub cpu: Option<u64>,
    /// MiB
    #[serde(default)]
    pub memory: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VcMetadata {
    #[serde(default)]
    capacity: Option<Resources>,
    #[serde(default)]
    quota: Option<Resources>,
}

/// Capacity and quota of one virtual cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VcQuota {
    pub name: String,
    pub capacity: Option<Resources>,
    pub quota: Option<Resources>,
}

impl VcQuota {
    /// Parse a row's JSON metadata blob
    ///
    /// Malformed or missing metadata leaves capacity and quota unknown.
    #[must_use]
    pub fn from_row(name: String, metadata: Option<&str>) -> Self {
        let parsed = metadata.and_then(|raw| {
            serde_json::from_str::<VcMetadata>(raw)
                .inspect_err(|e| warn!(vc = %name, error = %e, "unreadable VC metadata"))
                .ok()
        });

        match parsed {
            Some(meta) => Self {
                name,
                capacity: meta.capacity,
                quota: meta.quota,
            },
            None => Self {
                name,
                capacity: None,
                quota: None,
            },
        }
    }
}

/// Open a small pool; the tool issues one query per run
///
/// # Errors
/// Returns `CoreError::Database` if the database is unreachable.
pub async fn connect(url: &str) -> Result<PgPool> {
    Ok(PgPoolOptions::new().max_connections(2).connect(url).await?)
}

/// Quotas of the named VCs, or of every VC when `names` is empty
///
/// # Errors
/// Returns `CoreError::Database` if the query fails.
#[instrument(skip(pool))]
pub async fn vc_quotas(pool: &PgPool, names: &[String]) -> Result<Vec<VcQuota>> {
    let rows: Vec<(String, Option<String>)> = if names.is_empty() {
        sqlx::query_as(ALL_VCS).fetch_all(pool).await?
    } else {
        sqlx::query_as(SOME_VCS)
            .bind(names.to_vec())
            .fetch_all(pool)
            .await?
    };

    debug!(rows = rows.len(), "fetched VC metadata");

    for name in names {
        if !rows.iter().any(|(n, _)| n == name) {
            warn!(vc = %name, "virtual cluster not found");
        }
    }

    Ok(rows
        .into_iter()
        .map(|(name, metadata)| VcQuota::from_row(name, metadata.as_deref()))
        .collect())
}
