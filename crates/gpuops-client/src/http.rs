//! HTTP client for the scheduler's job-control endpoint

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{ClientError, Result};
use crate::types::{JobActionResponse, JobStatus};

const PAUSE_PATH: &str = "api/v1/jobs/pause";
const RESUME_PATH: &str = "api/v1/jobs/resume";
const STATUS_PATH: &str = "api/v1/jobs/status";

/// HTTP client for pausing, resuming and inspecting jobs
#[derive(Debug, Clone)]
pub struct JobClient {
    client: Client,
    base_url: Url,
}

impl JobClient {
    /// Create a new client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use gpuops_client::JobClient;
    ///
    /// let client = JobClient::new("http://scheduler.lab:9186")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client whose requests give up after `timeout`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, client)
    }

    /// Create a new client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let mut base_url = Url::parse(base_url.as_ref())?;
        // keep any path prefix when joining relative paths
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    /// Build a full URL from a path and query pairs
    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Perform a GET request and deserialize the response
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, message });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn id_list(ids: &[String]) -> Result<String> {
        let ids: Vec<&str> = ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect();

        if ids.is_empty() {
            return Err(ClientError::InvalidRequest("no job ids given".to_string()));
        }

        Ok(ids.join(","))
    }

    /// Pause every job in `ids`
    ///
    /// # Errors
    /// Returns an error if `ids` is empty, the request fails, or the endpoint
    /// answers with a non-success status.
    #[instrument(skip(self))]
    pub async fn pause_jobs(&self, ids: &[String]) -> Result<JobActionResponse> {
        let ids = Self::id_list(ids)?;
        self.get(self.url(PAUSE_PATH, &[("ids", &ids)])?).await
    }

    /// Resume every job in `ids`
    ///
    /// # Errors
    /// Returns an error if `ids` is empty, the request fails, or the endpoint
    /// answers with a non-success status.
    #[instrument(skip(self))]
    pub async fn resume_jobs(&self, ids: &[String]) -> Result<JobActionResponse> {
        let ids = Self::id_list(ids)?;
        self.get(self.url(RESUME_PATH, &[("ids", &ids)])?).await
    }

    /// Get the scheduler's view of one job
    ///
    /// # Errors
    /// Returns an error if the request fails or the endpoint answers with a
    /// non-success status.
    #[instrument(skip(self))]
    pub async fn job_status(&self, id: &str) -> Result<JobStatus> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ClientError::InvalidRequest("empty job id".to_string()));
        }
        self.get(self.url(STATUS_PATH, &[("id", id)])?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(JobClient::new("http://localhost:9186").is_ok());
    }

    #[test]
    fn test_invalid_url() {
        assert!(JobClient::new("not a url").is_err());
    }

    #[test]
    fn test_url_building_keeps_prefix() {
        let client = JobClient::new("http://gateway.lab/scheduler").unwrap();
        let url = client.url(PAUSE_PATH, &[("ids", "a,b")]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://gateway.lab/scheduler/api/v1/jobs/pause?ids=a%2Cb"
        );
    }

    #[test]
    fn test_id_list() {
        let ids = vec![" job-1".to_string(), String::new(), "job-2 ".to_string()];
        assert_eq!(JobClient::id_list(&ids).unwrap(), "job-1,job-2");
        assert!(matches!(
            JobClient::id_list(&[]),
            Err(ClientError::InvalidRequest(_))
        ));
    }
}
