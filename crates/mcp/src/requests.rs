//! Tool parameter types.
//!
//! Optional fields left out by the caller fall back to per-tool
//! defaults in the handlers; the doc comments become the JSON schema
//! descriptions clients see.

use rmcp::schemars;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ComfyGenerateRequest {
    /// Positive prompt describing the image
    pub prompt: String,
    /// Negative prompt. Default: "blurry, low quality, worst quality, low resolution"
    pub negative_prompt: Option<String>,
    /// Sampling steps. Default: 30, or the quality preset's value
    pub steps: Option<u32>,
    /// Guidance scale. Default: 8.0, or the quality preset's value
    pub cfg_scale: Option<f64>,
    /// Image width in pixels (multiple of 8). Default: 1024
    pub width: Option<u32>,
    /// Image height in pixels (multiple of 8). Default: 1024
    pub height: Option<u32>,
    /// ComfyUI sampler name. Default: "dpmpp_2m"
    pub sampler: Option<String>,
    /// ComfyUI scheduler name. Default: "karras"
    pub scheduler: Option<String>,
    /// Checkpoint filename. Default: the configured default model
    pub model: Option<String>,
    /// LoRA filename to apply on top of the checkpoint. Omit for none
    pub lora: Option<String>,
    /// LoRA strength for model and text encoder. Default: 0.7
    pub lora_strength: Option<f64>,
    /// Quality preset: "draft", "standard", "high" or "ultra". Fills any of steps, cfg_scale, sampler, scheduler, width and height not given explicitly. Unknown names use "high"
    pub quality_preset: Option<String>,
    /// Sampler seed. Default: random
    pub seed: Option<u64>,
    /// Output filename prefix. Default: "comfyui_txt2img"
    pub output_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ComfyGenerateHdRequest {
    /// Positive prompt describing the image
    pub prompt: String,
    /// Negative prompt. Default: "blurry, low quality, worst quality, low resolution, distorted"
    pub negative_prompt: Option<String>,
    /// Base resolution before upscaling: "512x512", "768x768" or "1024x1024". Default: "768x768"
    pub base_resolution: Option<String>,
    /// Latent upscale factor, 2 or 4. Default: 2
    pub upscale_factor: Option<u32>,
    /// Total steps, split 70/30 between base and refine passes. Default: 40
    pub steps: Option<u32>,
    /// Guidance scale of the base pass; the refine pass uses one less. Default: 8.0
    pub cfg_scale: Option<f64>,
    /// Checkpoint filename. Default: the configured default model
    pub model: Option<String>,
    /// LoRA filename. Omit for none
    pub lora: Option<String>,
    /// LoRA strength. Default: 0.7
    pub lora_strength: Option<f64>,
    /// Sampler seed. Default: random
    pub seed: Option<u64>,
    /// Output filename prefix. Default: "ComfyUI_HD"
    pub output_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct WebuiGenerateRequest {
    /// Positive prompt describing the image
    pub prompt: String,
    /// Negative prompt. Default: "blurry, low quality"
    pub negative_prompt: Option<String>,
    /// Sampling steps. Default: 20
    pub steps: Option<u32>,
    /// Guidance scale. Default: 7.0
    pub cfg_scale: Option<f64>,
    /// Image width in pixels. Default: 512
    pub width: Option<u32>,
    /// Image height in pixels. Default: 512
    pub height: Option<u32>,
    /// WebUI sampler name. Default: "DPM++ 2M Karras"
    pub sampler_name: Option<String>,
    /// Output filename stem; a timestamp and ".png" are appended. Default: "webui_generated"
    pub output_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct InpaintingRequest {
    /// Path to the image to modify
    pub reference_image: String,
    /// Path to the mask image; white areas are regenerated
    pub mask_image: String,
    /// Prompt describing the content of the masked area
    pub prompt: String,
    /// Negative prompt. Default: "blurry, low quality, artifacts"
    pub negative_prompt: Option<String>,
    /// Sampling steps. Default: 20
    pub steps: Option<u32>,
    /// Guidance scale. Default: 7.0
    pub cfg_scale: Option<f64>,
    /// Denoising strength 0.0-1.0; lower keeps more of the reference image. Default: 0.75
    pub denoise: Option<f64>,
    /// Checkpoint filename. Default: the configured default model
    pub model: Option<String>,
    /// Sampler seed. Default: random
    pub seed: Option<u64>,
    /// Output filename prefix. Default depends on the method that succeeds
    pub output_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ControlNetReferenceRequest {
    /// Path to the reference image whose structure is preserved
    pub reference_image: String,
    /// Prompt describing the variation to generate
    pub prompt: String,
    /// Negative prompt. Default: "blurry, low quality, different lighting, different angle"
    pub negative_prompt: Option<String>,
    /// ControlNet type: "canny", "depth" or "canny+depth". Default: "canny"
    pub controlnet_type: Option<String>,
    /// ControlNet strength 0.0-1.0. Default: 0.8
    pub canny_strength: Option<f64>,
    /// Reference image influence 0.0-1.0, reported back with the result. Default: 0.9
    pub reference_strength: Option<f64>,
    /// Sampling steps. Default: 25
    pub steps: Option<u32>,
    /// Guidance scale. Default: 7.5
    pub cfg_scale: Option<f64>,
    /// Checkpoint filename. Default: the configured default model
    pub model: Option<String>,
    /// Sampler seed. Default: random
    pub seed: Option<u64>,
    /// Output filename prefix. Default: "ControlNet_Reference"
    pub output_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListModelsRequest {
    /// Which backend to query: "comfyui", "webui" or "both". Default: "both"
    pub service: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ListOutputsRequest {
    /// Maximum number of images to return, newest first. Default: 10
    pub limit: Option<usize>,
}
