//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Covers what generation needs: health (`/system_stats`), workflow
//! submission (`/prompt`), history retrieval (`/history/{id}`) and
//! checkpoint discovery (`/object_info`).

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::history::{parse_history, HistoryEntry};
use crate::workflow::Workflow;

/// HTTP client for a single ComfyUI instance.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `/prompt` after queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i64,
    /// Per-node validation errors, empty when the graph was accepted.
    #[serde(default)]
    pub node_errors: Value,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, timeout, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose JSON did not have the expected shape.
    #[error("Unexpected ComfyUI response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ComfyUIApi {
    /// Create a client with its own connection pool and a request timeout.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// URL used as the liveness probe.
    pub fn health_url(&self) -> String {
        format!("{}/system_stats", self.api_url)
    }

    /// `GET /system_stats`: device and version info, doubles as health check.
    pub async fn system_stats(&self) -> Result<Value, ComfyUIApiError> {
        let response = self.client.get(self.health_url()).send().await?;
        Self::parse_response(response).await
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the graph and a client id. Returns the
    /// server-assigned `prompt_id` and queue position.
    pub async fn submit_workflow(
        &self,
        workflow: &Workflow,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// `Ok(None)` while the prompt is still queued or running.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        let body: Value = Self::parse_response(response).await?;
        Ok(parse_history(prompt_id, body)?)
    }

    /// Checkpoint names the backend can load, as listed for
    /// `CheckpointLoaderSimple.ckpt_name`.
    pub async fn checkpoint_names(&self) -> Result<Vec<String>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/object_info/CheckpointLoaderSimple", self.api_url))
            .send()
            .await?;

        let body: Value = Self::parse_response(response).await?;
        Ok(extract_checkpoint_names(&body))
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or turn it into a
    /// [`ComfyUIApiError::ApiError`] carrying the body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// `CheckpointLoaderSimple.input.required.ckpt_name[0]`, or empty.
fn extract_checkpoint_names(object_info: &Value) -> Vec<String> {
    object_info
        .pointer("/CheckpointLoaderSimple/input/required/ckpt_name/0")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
