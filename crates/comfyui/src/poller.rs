//! Submit a workflow and poll its history until it finishes.
//!
//! ComfyUI has no synchronous "run and return" call: a prompt is queued
//! with `POST /prompt` and its result appears in `/history/{id}` once
//! execution ends. [`submit_and_wait`] polls at a fixed interval until a
//! terminal status or the deadline.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::history::{HistoryEntry, ImageRecord, JobState};
use crate::workflow::Workflow;

/// The two backend calls the poller needs.
pub trait PromptBackend: Send + Sync {
    /// Queue `workflow`; returns the prompt id.
    fn submit(
        &self,
        workflow: &Workflow,
        client_id: &str,
    ) -> impl Future<Output = Result<String, ComfyUIApiError>> + Send;

    /// History for `prompt_id`, `None` while unfinished.
    fn history(
        &self,
        prompt_id: &str,
    ) -> impl Future<Output = Result<Option<HistoryEntry>, ComfyUIApiError>> + Send;
}

impl PromptBackend for ComfyUIApi {
    async fn submit(&self, workflow: &Workflow, client_id: &str) -> Result<String, ComfyUIApiError> {
        Ok(self.submit_workflow(workflow, client_id).await?.prompt_id)
    }

    async fn history(&self, prompt_id: &str) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        self.get_history(prompt_id).await
    }
}

/// Polling cadence and deadline.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

/// A finished prompt and the image it produced.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub prompt_id: String,
    pub image: ImageRecord,
    /// History requests made, successful or not.
    pub polls: u32,
    pub elapsed: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Failed to submit workflow: {0}")]
    Submit(#[source] ComfyUIApiError),

    #[error("ComfyUI execution error: {message}")]
    Execution { prompt_id: String, message: String },

    #[error("ComfyUI execution failed with unknown error")]
    Failed { prompt_id: String },

    #[error("No images generated")]
    NoImages { prompt_id: String },

    #[error("{}", timeout_message(.elapsed, .failed_polls, .last_error))]
    Timeout {
        prompt_id: String,
        elapsed: Duration,
        /// Polls that failed with a transport or API error.
        failed_polls: u32,
        last_error: Option<String>,
    },
}

fn timeout_message(elapsed: &Duration, failed_polls: &u32, last_error: &Option<String>) -> String {
    let mut msg = format!("ComfyUI generation timeout after {}s", elapsed.as_secs());
    if let Some(err) = last_error {
        msg.push_str(&format!(
            " ({failed_polls} history polls failed, last error: {err})"
        ));
    }
    msg
}

/// Submit `workflow` once and wait for its first output image.
///
/// History is polled immediately after submission and then every
/// `config.interval`. Failed polls are retried until the deadline.
pub async fn submit_and_wait<B: PromptBackend>(
    backend: &B,
    workflow: &Workflow,
    config: &PollConfig,
) -> Result<CompletedJob, PollError> {
    let client_id = uuid::Uuid::new_v4().to_string();
    let prompt_id = backend
        .submit(workflow, &client_id)
        .await
        .map_err(PollError::Submit)?;
    tracing::info!(prompt_id = %prompt_id, nodes = workflow.len(), "Started generation");

    let start = Instant::now();
    let mut polls = 0u32;
    let mut failed_polls = 0u32;
    let mut last_error: Option<String> = None;

    while start.elapsed() < config.timeout {
        polls += 1;
        match backend.history(&prompt_id).await {
            Ok(Some(entry)) => match entry.state() {
                JobState::Succeeded => {
                    let Some(image) = entry.first_image().cloned() else {
                        return Err(PollError::NoImages { prompt_id });
                    };
                    let elapsed = start.elapsed();
                    tracing::info!(
                        prompt_id = %prompt_id,
                        filename = %image.filename,
                        polls,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Generation finished",
                    );
                    return Ok(CompletedJob {
                        prompt_id,
                        image,
                        polls,
                        elapsed,
                    });
                }
                JobState::Failed(Some(message)) => {
                    return Err(PollError::Execution { prompt_id, message });
                }
                JobState::Failed(None) => return Err(PollError::Failed { prompt_id }),
                JobState::Running => {}
            },
            Ok(None) => {}
            Err(e) => {
                failed_polls += 1;
                tracing::warn!(
                    prompt_id = %prompt_id,
                    failed_polls,
                    error = %e,
                    "History poll failed, retrying",
                );
                last_error = Some(e.to_string());
            }
        }

        tokio::time::sleep(config.interval).await;
    }

    Err(PollError::Timeout {
        prompt_id,
        elapsed: start.elapsed(),
        failed_polls,
        last_error,
    })
}
