//! MCP tool surface.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};

use crate::error::ToolResult;
use crate::handlers;
use crate::requests::{
    ComfyGenerateHdRequest, ComfyGenerateRequest, ControlNetReferenceRequest, InpaintingRequest,
    ListModelsRequest, ListOutputsRequest, WebuiGenerateRequest,
};
use crate::response::ToolOutput;
use crate::service::GenerationService;

const INSTRUCTIONS: &str = r#"Image generation through local Stable Diffusion backends.

ComfyUI tools (comfyui_generate, comfyui_generate_hd, comfyui_inpainting, comfyui_controlnet_reference) build node workflows and run them on ComfyUI. webui_generate uses Stable Diffusion WebUI. Backends that are not running are started with their launch scripts on first use, which can take a few minutes.

Generated images are written to the configured output directory; every result includes the saved file path. Use check_services to see which backends are up, list_models for available checkpoints and list_outputs for recent images.

Failed calls return text starting with "Error [CODE]:" where CODE is one of BACKEND_UNAVAILABLE, INVALID_ARGUMENT, NO_IMAGES, GENERATION_FAILED, TIMEOUT, IO_ERROR or UPSTREAM_ERROR."#;

#[derive(Clone)]
pub struct ImageGenServer {
    service: Arc<GenerationService>,
    tool_router: ToolRouter<Self>,
}

/// Render a handler result. Tool failures become error results rather
/// than protocol errors so the client sees the message.
fn finish(tool: &str, result: ToolResult<ToolOutput>) -> Result<CallToolResult, McpError> {
    Ok(match result {
        Ok(output) => {
            tracing::info!(tool, "Tool call completed");
            output.into_call_result()
        }
        Err(e) => e.into_call_result(tool),
    })
}

#[tool_router]
impl ImageGenServer {
    pub fn new(service: GenerationService) -> Self {
        Self {
            service: Arc::new(service),
            tool_router: Self::tool_router(),
        }
    }

    pub fn service(&self) -> &GenerationService {
        &self.service
    }

    #[tool(
        description = "Generate an image from a text prompt with ComfyUI. Supports an optional LoRA and quality presets (draft, standard, high, ultra) that fill any sampling settings not given explicitly. Starts ComfyUI if it is not running."
    )]
    async fn comfyui_generate(
        &self,
        Parameters(req): Parameters<ComfyGenerateRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(prompt = %req.prompt, "comfyui_generate");
        finish("comfyui_generate", handlers::generate::run(&self.service, req).await)
    }

    #[tool(
        description = "Generate a high-resolution image with ComfyUI in two passes: a base render, a latent upscale (2x or 4x) and a refining pass over the upscaled latent."
    )]
    async fn comfyui_generate_hd(
        &self,
        Parameters(req): Parameters<ComfyGenerateHdRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(prompt = %req.prompt, "comfyui_generate_hd");
        finish("comfyui_generate_hd", handlers::hd::run(&self.service, req).await)
    }

    #[tool(
        description = "Generate an image from a text prompt with Stable Diffusion WebUI. Starts WebUI if it is not running."
    )]
    async fn webui_generate(
        &self,
        Parameters(req): Parameters<WebuiGenerateRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(prompt = %req.prompt, "webui_generate");
        finish("webui_generate", handlers::webui::run(&self.service, req).await)
    }

    #[tool(
        description = "Regenerate the masked area of an image. Tries ComfyUI inpainting first, then WebUI img2img inpainting, and as a last resort generates a new image from the prompt. The result reports which method succeeded."
    )]
    async fn comfyui_inpainting(
        &self,
        Parameters(req): Parameters<InpaintingRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            reference = %req.reference_image,
            mask = %req.mask_image,
            "comfyui_inpainting"
        );
        finish("comfyui_inpainting", handlers::inpaint::run(&self.service, req).await)
    }

    #[tool(
        description = "Generate a variation of a reference image that keeps its structure, guided by ControlNet edge (canny), depth or combined canny+depth maps."
    )]
    async fn comfyui_controlnet_reference(
        &self,
        Parameters(req): Parameters<ControlNetReferenceRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            reference = %req.reference_image,
            prompt = %req.prompt,
            "comfyui_controlnet_reference"
        );
        finish(
            "comfyui_controlnet_reference",
            handlers::controlnet::run(&self.service, req).await,
        )
    }

    #[tool(description = "Check whether ComfyUI and WebUI are running. Does not start them.")]
    async fn check_services(&self) -> Result<CallToolResult, McpError> {
        finish("check_services", handlers::status::run(&self.service).await)
    }

    #[tool(
        description = "List checkpoint models available on ComfyUI, WebUI or both. Falls back to ComfyUI's checkpoint directory when ComfyUI is not running."
    )]
    async fn list_models(
        &self,
        Parameters(req): Parameters<ListModelsRequest>,
    ) -> Result<CallToolResult, McpError> {
        finish("list_models", handlers::models::run(&self.service, req).await)
    }

    #[tool(description = "List the most recently generated images in the output directory.")]
    async fn list_outputs(
        &self,
        Parameters(req): Parameters<ListOutputsRequest>,
    ) -> Result<CallToolResult, McpError> {
        finish("list_outputs", handlers::outputs::run(&self.service, req).await)
    }
}

#[tool_handler]
impl ServerHandler for ImageGenServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
