//! gpuops-core: Cluster operations for the GPU fleet
//!
//! Configuration provider chain, the explicit per-invocation context, and the
//! operations behind each operator action: node capacity and cordoning via the
//! orchestrator API, job placement, VC quotas from the scheduler database, and
//! SSH maintenance through the fleet executor.

pub mod config;
pub mod context;
pub mod error;
pub mod maintenance;
pub mod nodes;
pub mod placement;
pub mod provider;
pub mod vc;

pub use config::{ClusterSettings, HealthSettings, SshSettings};
pub use context::OpsContext;
pub use error::{CoreError, Result};
pub use maintenance::NodeFleet;
pub use nodes::{NodeSummary, PatchReport};
pub use placement::{JobPlacement, PlacementFilter};
pub use provider::{ConfigProvider, EnvProvider, FileProvider, MapProvider, ProviderChain};
pub use vc::{Resources, VcQuota};
