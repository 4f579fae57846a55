//! Request and response bodies of the WebUI API.

use serde::{Deserialize, Serialize};

/// Sampler used when the caller does not pick one.
pub const DEFAULT_SAMPLER: &str = "DPM++ 2M Karras";

/// Body of `POST /sdapi/v1/txt2img`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Txt2ImgRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
    pub batch_size: u32,
    pub n_iter: u32,
    /// `-1` lets the backend pick.
    pub seed: i64,
}

impl Txt2ImgRequest {
    /// Single image, random seed.
    pub fn new(prompt: impl Into<String>, negative_prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: negative_prompt.into(),
            steps: 20,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            sampler_name: DEFAULT_SAMPLER.to_string(),
            batch_size: 1,
            n_iter: 1,
            seed: -1,
        }
    }
}

/// Body of `POST /sdapi/v1/img2img`, set up for masked inpainting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Img2ImgRequest {
    /// Base64-encoded source images.
    pub init_images: Vec<String>,
    /// Base64-encoded mask; white areas are regenerated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub denoising_strength: f64,
    pub inpaint_full_res: bool,
    pub inpaint_full_res_padding: u32,
    pub inpainting_mask_invert: u8,
    pub mask_blur: u32,
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
}

impl Img2ImgRequest {
    /// Inpaint `mask` (base64) over `init_image` (base64) at 512x512.
    pub fn inpaint(
        init_image: String,
        mask: String,
        prompt: impl Into<String>,
        negative_prompt: impl Into<String>,
    ) -> Self {
        Self {
            init_images: vec![init_image],
            mask: Some(mask),
            prompt: prompt.into(),
            negative_prompt: negative_prompt.into(),
            steps: 20,
            cfg_scale: 7.0,
            denoising_strength: 0.75,
            inpaint_full_res: true,
            inpaint_full_res_padding: 32,
            inpainting_mask_invert: 0,
            mask_blur: 4,
            width: 512,
            height: 512,
            sampler_name: DEFAULT_SAMPLER.to_string(),
        }
    }
}

/// Response of both generation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesResponse {
    /// Base64-encoded PNGs.
    #[serde(default)]
    pub images: Vec<String>,
    /// Echo of the effective parameters.
    #[serde(default)]
    pub parameters: serde_json::Value,
    /// JSON-encoded string with seed and other generation details.
    #[serde(default)]
    pub info: Option<String>,
}

/// Entry of `GET /sdapi/v1/sd-models`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SdModel {
    pub title: String,
    pub model_name: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Entry of `GET /sdapi/v1/samplers`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplerInfo {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}
