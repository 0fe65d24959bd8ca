//! Fleet targets: node identifiers and their SSH addresses

use std::fmt;

use serde::{Deserialize, Serialize};

/// One node addressed by a fleet batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Node identifier as the operator typed it
    pub id: String,
    /// Fully qualified address used for the SSH connection
    pub address: String,
}

impl Target {
    /// Target whose address is the identifier itself
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            address: id.clone(),
            id,
        }
    }

    /// Qualify a bare node identifier with the cluster's domain suffix
    ///
    /// The suffix may be given with or without its leading dot. An empty
    /// suffix leaves the identifier untouched, and an identifier that already
    /// carries the suffix is not qualified twice.
    pub fn qualify(id: impl Into<String>, domain_suffix: &str) -> Self {
        let id = id.into();
        let suffix = domain_suffix.trim().trim_start_matches('.');

        let address = if suffix.is_empty() || id.ends_with(&format!(".{suffix}")) {
            id.clone()
        } else {
            format!("{id}.{suffix}")
        };

        Self { id, address }
    }

    /// Qualify every identifier in order, keeping duplicates
    pub fn qualify_all<I, S>(ids: I, domain_suffix: &str) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter()
            .map(|id| Self::qualify(id, domain_suffix))
            .collect()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
