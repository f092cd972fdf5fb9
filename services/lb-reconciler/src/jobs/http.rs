//! Job operations served by the control plane API.

use std::time::Duration;

use async_trait::async_trait;
use corral_id::JobId;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error};

use super::JobOperations;
use crate::error::JobOperationsError;
use crate::model::{Job, Task};

#[derive(Debug, Deserialize)]
struct TaskList {
    items: Vec<Task>,
}

/// Control plane client for job and task lookups.
pub struct ControlPlaneJobOperations {
    client: reqwest::Client,
    base_url: String,
}

impl ControlPlaneJobOperations {
    /// Create a client for the control plane at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, JobOperationsError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn error_for(response: reqwest::Response) -> JobOperationsError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %body, "Control plane request failed");
        JobOperationsError::Status {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl JobOperations for ControlPlaneJobOperations {
    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, JobOperationsError> {
        let url = format!("{}/v1/jobs/{}", self.base_url, job_id);
        debug!(url = %url, "Fetching job");

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        Ok(Some(response.json().await?))
    }

    async fn list_tasks(&self, job_id: &JobId) -> Result<Vec<Task>, JobOperationsError> {
        let url = format!("{}/v1/jobs/{}/tasks", self.base_url, job_id);
        debug!(url = %url, "Listing tasks");

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(JobOperationsError::JobNotFound(*job_id));
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let list: TaskList = response.json().await?;
        debug!(job_id = %job_id, task_count = list.items.len(), "Listed tasks");
        Ok(list.items)
    }
}
