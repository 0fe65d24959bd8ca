//! gpuops-exec: Remote execution for the GPU fleet
//!
//! Provides the remote shell transports (native SSH and the system `ssh`
//! binary), credential resolution, and the fleet executor that fans one
//! command out to many nodes and collects per-node outcomes in input order.

pub mod error;
pub mod factory;
pub mod fleet;
pub mod keys;
pub mod openssh;
pub mod result;
pub mod ssh;
pub mod target;
pub mod traits;

pub use error::ExecError;
pub use factory::{Credential, ExecutorFactory, SshFactory, Transport};
pub use fleet::{FleetExecutor, outputs};
pub use keys::{KeyError, KeySource, ResolvedKey};
pub use result::{CommandResult, ConnectionInfo, HostOutcome};
pub use target::Target;
pub use traits::RemoteExecutor;
