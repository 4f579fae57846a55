//! Generation orchestration shared by all tools.
//!
//! [`GenerationService`] owns the backend clients and launchers and
//! implements the common flows: make sure a backend is up, run the job,
//! and deliver the resulting image into the configured output directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use imagegen_comfyui::api::ComfyUIApi;
use imagegen_comfyui::poller::{submit_and_wait, PollConfig};
use imagegen_comfyui::workflow::Workflow;
use imagegen_core::config::AppConfig;
use imagegen_core::error::CoreError;
use imagegen_core::naming::output_filename;
use imagegen_core::outputs::{ensure_dir, relocate_output, stage_input_image};
use imagegen_launcher::{HttpLauncher, LaunchOutcome, LauncherConfig};
use imagegen_webui::api::{encode_image, WebUIApi};
use imagegen_webui::types::{Img2ImgRequest, ImagesResponse, Txt2ImgRequest};

use crate::error::ToolResult;

/// Request timeout for ComfyUI submit/history/object_info calls.
const COMFYUI_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A delivered image.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    /// Strategy that produced the image.
    pub method: String,
    pub filename: String,
    pub output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    /// `false` when the image could not be copied out of ComfyUI's own
    /// output directory and `output_path` points there instead.
    pub relocated: bool,
    pub elapsed_ms: u64,
}

pub struct GenerationService {
    config: AppConfig,
    comfyui: ComfyUIApi,
    webui: WebUIApi,
    comfyui_launcher: HttpLauncher,
    webui_launcher: HttpLauncher,
}

impl GenerationService {
    pub fn new(config: AppConfig) -> ToolResult<Self> {
        let comfyui = ComfyUIApi::new(&config.comfyui_api_url, COMFYUI_REQUEST_TIMEOUT)?;
        let webui = WebUIApi::new(&config.webui_api_url, config.webui_request_timeout)?;

        let probe_client = reqwest::Client::new();
        let comfyui_launcher = HttpLauncher::http(
            LauncherConfig::new(
                "ComfyUI",
                config.comfyui_script.clone(),
                config.comfyui_startup_timeout,
            ),
            probe_client.clone(),
            comfyui.health_url(),
            config.api_request_timeout,
        );
        let webui_launcher = HttpLauncher::http(
            LauncherConfig::new("WebUI", config.webui_script.clone(), config.webui_startup_timeout),
            probe_client,
            webui.health_url(),
            config.api_request_timeout,
        );

        Ok(Self {
            config,
            comfyui,
            webui,
            comfyui_launcher,
            webui_launcher,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn comfyui(&self) -> &ComfyUIApi {
        &self.comfyui
    }

    pub fn webui(&self) -> &WebUIApi {
        &self.webui
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.config.poll_interval,
            timeout: self.config.generation_timeout,
        }
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    pub async fn comfyui_running(&self) -> bool {
        self.comfyui_launcher.probe().await
    }

    pub async fn webui_running(&self) -> bool {
        self.webui_launcher.probe().await
    }

    pub async fn ensure_comfyui(&self) -> ToolResult<LaunchOutcome> {
        Ok(self.comfyui_launcher.ensure_running().await?)
    }

    pub async fn ensure_webui(&self) -> ToolResult<LaunchOutcome> {
        Ok(self.webui_launcher.ensure_running().await?)
    }

    // -----------------------------------------------------------------------
    // ComfyUI
    // -----------------------------------------------------------------------

    /// Run `workflow` on ComfyUI and copy its image into the output
    /// directory. `prefix` is the workflow's `SaveImage` filename prefix.
    pub async fn run_comfyui_workflow(
        &self,
        workflow: &Workflow,
        prefix: &str,
        method: &str,
    ) -> ToolResult<GenerationOutcome> {
        let start = Instant::now();
        self.ensure_comfyui().await?;

        let job = submit_and_wait(&self.comfyui, workflow, &self.poll_config()).await?;

        let source_dir = self.config.comfyui_output_dir.join(&job.image.subfolder);
        let relocated = relocate_output(
            &source_dir,
            &self.config.output_dir,
            Some(&job.image.filename),
            prefix,
        )
        .await?;

        let (output_path, relocated) = match relocated {
            Some(path) => (path, true),
            None => (source_dir.join(&job.image.filename), false),
        };

        Ok(GenerationOutcome {
            method: method.to_string(),
            filename: file_name_of(&output_path).unwrap_or(job.image.filename),
            output_path,
            prompt_id: Some(job.prompt_id),
            relocated,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Copy a local image into ComfyUI's input directory.
    ///
    /// Returns the name a `LoadImage` node should reference.
    pub async fn stage_image(&self, source: &Path, name: &str) -> ToolResult<String> {
        Ok(stage_input_image(source, &self.config.comfyui_input_dir, name, Utc::now()).await?)
    }

    // -----------------------------------------------------------------------
    // WebUI
    // -----------------------------------------------------------------------

    pub async fn run_webui_txt2img(
        &self,
        request: &Txt2ImgRequest,
        stem: &str,
        method: &str,
    ) -> ToolResult<GenerationOutcome> {
        let start = Instant::now();
        self.ensure_webui().await?;
        let response = self.webui.txt2img(request).await?;
        self.save_webui_image(&response, stem, method, start).await
    }

    pub async fn run_webui_img2img(
        &self,
        request: &Img2ImgRequest,
        stem: &str,
        method: &str,
    ) -> ToolResult<GenerationOutcome> {
        let start = Instant::now();
        self.ensure_webui().await?;
        let response = self.webui.img2img(request).await?;
        self.save_webui_image(&response, stem, method, start).await
    }

    async fn save_webui_image(
        &self,
        response: &ImagesResponse,
        stem: &str,
        method: &str,
        start: Instant,
    ) -> ToolResult<GenerationOutcome> {
        let bytes = response.first_image()?;

        ensure_dir(&self.config.output_dir).await?;
        let filename = output_filename(stem, "png", Utc::now());
        let output_path = self.config.output_dir.join(&filename);
        tokio::fs::write(&output_path, &bytes)
            .await
            .map_err(|e| CoreError::io(&output_path, e))?;

        tracing::info!(
            path = %output_path.display(),
            bytes = bytes.len(),
            "Saved WebUI image",
        );
        Ok(GenerationOutcome {
            method: method.to_string(),
            filename,
            output_path,
            prompt_id: None,
            relocated: true,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Read a local image and base64-encode it for the WebUI API.
pub async fn read_image_base64(path: &Path) -> ToolResult<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::io(path, e))?;
    Ok(encode_image(&bytes))
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}
