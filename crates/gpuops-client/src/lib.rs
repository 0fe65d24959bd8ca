//! gpuops-client: HTTP client for the job-control endpoint
//!
//! The scheduler exposes three GET operations: pause a list of jobs, resume a
//! list of jobs, and report one job's status.
//!
//! ```no_run
//! use gpuops_client::JobClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = JobClient::new("http://scheduler.lab:9186")?;
//!
//! let paused = client.pause_jobs(&["job-17".into(), "job-18".into()]).await?;
//! println!("paused: {:?}", paused.succeeded);
//!
//! let status = client.job_status("job-17").await?;
//! println!("{} is {}", status.id, status.state);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod types;

pub use error::{ClientError, Result};
pub use http::JobClient;
pub use types::{JobActionResponse, JobStatus};
