//! REST client for the curator API.
//!
//! Wraps the read endpoints the watcher needs (job listing, single job,
//! workflow errors) using [`reqwest`], authenticated with the user's
//! bearer token.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use curator_core::job::{JobWithSteps, WorkflowError};
use curator_core::types::DbId;

/// Page size requested when listing jobs and errors.
const LIST_LIMIT: u32 = 100;

/// HTTP client for one curator API server.
pub struct ApiClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

/// Errors from the REST client.
#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Deserialize)]
struct DataResponse<T> {
    data: T,
}

impl ApiClient {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:3000`.
    pub fn new(api_url: String, token: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, token)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String, token: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// List the user's most recent jobs with their steps.
    pub async fn list_jobs(&self) -> Result<Vec<JobWithSteps>, ApiClientError> {
        self.get(&format!("/api/v1/jobs?limit={LIST_LIMIT}")).await
    }

    /// Fetch one job with its steps sorted by step order.
    pub async fn get_job(&self, job_id: DbId) -> Result<JobWithSteps, ApiClientError> {
        self.get(&format!("/api/v1/jobs/{job_id}")).await
    }

    /// List the user's most recent workflow errors.
    pub async fn list_workflow_errors(&self) -> Result<Vec<WorkflowError>, ApiClientError> {
        self.get(&format!("/api/v1/workflow-errors?limit={LIST_LIMIT}"))
            .await
    }

    // ---- private helpers ----

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiClientError> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope = response.json::<DataResponse<T>>().await?;
        Ok(envelope.data)
    }
}
