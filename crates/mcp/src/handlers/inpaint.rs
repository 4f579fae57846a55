//! `comfyui_inpainting`: masked regeneration with a fallback chain.
//!
//! Order: ComfyUI graph inpainting, then WebUI img2img inpainting, then
//! a plain ComfyUI text-to-image render of the prompt so the caller
//! still gets an image when neither inpainting path works.

use std::path::Path;

use serde_json::json;

use imagegen_comfyui::templates::{inpainting, text_to_image, InpaintParams, TextToImageParams, INPAINT_PREFIX};
use imagegen_core::fallback::{first_success, Attempt};
use imagegen_core::preset::{resolve_settings, SettingOverrides};
use imagegen_webui::types::Img2ImgRequest;

use super::generate::tool_defaults;
use super::{check_cfg, check_steps, check_unit_range, existing_image, output_prefix, require_prompt};
use crate::error::ToolResult;
use crate::requests::InpaintingRequest;
use crate::response::{summary, ToolOutput};
use crate::service::{read_image_base64, GenerationOutcome, GenerationService};

pub const DEFAULT_NEGATIVE: &str = "blurry, low quality, artifacts";
const FALLBACK_PROMPT_SUFFIX: &str = ", escape room, indoor scene, detailed environment";
const FALLBACK_SIZE: u32 = 512;

pub const METHOD_COMFYUI: &str = "comfyui_inpainting";
pub const METHOD_WEBUI: &str = "webui_inpainting_fallback";
pub const METHOD_SIMPLE: &str = "simple_generation_fallback";

/// Arguments with every default applied.
#[derive(Debug, Clone)]
struct Resolved {
    reference_image: String,
    mask_image: String,
    prompt: String,
    negative_prompt: String,
    steps: u32,
    cfg: f64,
    denoise: f64,
    model: String,
    seed: Option<u64>,
    output_name: Option<String>,
}

fn resolve(req: InpaintingRequest, default_model: &str) -> ToolResult<Resolved> {
    require_prompt(&req.prompt)?;
    Ok(Resolved {
        steps: check_steps(req.steps.unwrap_or(20))?,
        cfg: check_cfg(req.cfg_scale.unwrap_or(7.0))?,
        denoise: check_unit_range("denoise", req.denoise.unwrap_or(0.75))?,
        negative_prompt: req.negative_prompt.unwrap_or_else(|| DEFAULT_NEGATIVE.into()),
        model: req.model.unwrap_or_else(|| default_model.to_string()),
        reference_image: req.reference_image,
        mask_image: req.mask_image,
        prompt: req.prompt,
        seed: req.seed,
        output_name: req.output_name,
    })
}

async fn comfyui_inpaint(service: &GenerationService, r: &Resolved) -> ToolResult<GenerationOutcome> {
    let image = service
        .stage_image(Path::new(&r.reference_image), "reference.png")
        .await?;
    let mask = service.stage_image(Path::new(&r.mask_image), "mask.png").await?;
    let prefix = output_prefix(r.output_name.as_deref(), INPAINT_PREFIX);

    let workflow = inpainting(&InpaintParams {
        checkpoint: r.model.clone(),
        image,
        mask,
        prompt: r.prompt.clone(),
        negative_prompt: r.negative_prompt.clone(),
        steps: r.steps,
        cfg: r.cfg,
        denoise: r.denoise,
        seed: r.seed,
        filename_prefix: Some(prefix.clone()),
    });
    service
        .run_comfyui_workflow(&workflow, &prefix, METHOD_COMFYUI)
        .await
}

async fn webui_inpaint(service: &GenerationService, r: &Resolved) -> ToolResult<GenerationOutcome> {
    let init_image = read_image_base64(Path::new(&r.reference_image)).await?;
    let mask = read_image_base64(Path::new(&r.mask_image)).await?;

    let mut body = Img2ImgRequest::inpaint(init_image, mask, r.prompt.clone(), r.negative_prompt.clone());
    body.steps = r.steps;
    body.cfg_scale = r.cfg;
    body.denoising_strength = r.denoise;

    let stem = output_prefix(r.output_name.as_deref(), "webui_inpaint");
    service.run_webui_img2img(&body, &stem, METHOD_WEBUI).await
}

async fn simple_generation(service: &GenerationService, r: &Resolved) -> ToolResult<GenerationOutcome> {
    let overrides = SettingOverrides {
        steps: Some(r.steps),
        cfg: Some(r.cfg),
        width: Some(FALLBACK_SIZE),
        height: Some(FALLBACK_SIZE),
        ..Default::default()
    };
    let settings = resolve_settings(Some("standard"), &overrides, &tool_defaults());
    let prefix = output_prefix(r.output_name.as_deref(), "simple_fallback");

    let workflow = text_to_image(&TextToImageParams {
        checkpoint: r.model.clone(),
        prompt: format!("{}{FALLBACK_PROMPT_SUFFIX}", r.prompt),
        negative_prompt: r.negative_prompt.clone(),
        width: settings.width,
        height: settings.height,
        steps: settings.steps,
        cfg: settings.cfg,
        sampler: settings.sampler,
        scheduler: settings.scheduler,
        lora: None,
        seed: r.seed,
        filename_prefix: Some(prefix.clone()),
    });
    service
        .run_comfyui_workflow(&workflow, &prefix, METHOD_SIMPLE)
        .await
}

pub async fn run(service: &GenerationService, req: InpaintingRequest) -> ToolResult<ToolOutput> {
    existing_image("reference_image", &req.reference_image).await?;
    existing_image("mask_image", &req.mask_image).await?;
    let r = resolve(req, &service.config().default_model)?;

    let success = first_success(vec![
        Attempt::new(METHOD_COMFYUI, comfyui_inpaint(service, &r)),
        Attempt::new(METHOD_WEBUI, webui_inpaint(service, &r)),
        Attempt::new(METHOD_SIMPLE, simple_generation(service, &r)),
    ])
    .await?;

    let outcome = success.value;
    let mut lines = vec![
        ("File", outcome.output_path.display().to_string()),
        ("Method", success.method.to_string()),
        ("Prompt", r.prompt.clone()),
        ("Steps", r.steps.to_string()),
        ("Denoise", r.denoise.to_string()),
    ];
    if success.method == METHOD_SIMPLE {
        lines.push((
            "Note",
            "Generated a new image instead of inpainting; both inpainting methods failed".into(),
        ));
    }
    let heading = if success.failures.is_empty() {
        "Inpainting completed"
    } else {
        "Inpainting completed via fallback"
    };

    let failures: Vec<_> = success
        .failures
        .iter()
        .map(|f| json!({ "method": f.method, "error": f.message }))
        .collect();
    let data = json!({
        "result": outcome,
        "failed_methods": failures,
        "settings": {
            "reference_image": r.reference_image,
            "mask_image": r.mask_image,
            "steps": r.steps,
            "cfg_scale": r.cfg,
            "denoise": r.denoise,
            "model": r.model,
        },
    });
    Ok(ToolOutput::new(summary(heading, &lines), &data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let r = resolve(
            InpaintingRequest {
                reference_image: "room.png".into(),
                mask_image: "mask.png".into(),
                prompt: "a key".into(),
                ..Default::default()
            },
            "base.safetensors",
        )
        .unwrap();
        assert_eq!(r.steps, 20);
        assert_eq!(r.cfg, 7.0);
        assert_eq!(r.denoise, 0.75);
        assert_eq!(r.negative_prompt, DEFAULT_NEGATIVE);
        assert_eq!(r.model, "base.safetensors");
    }

    #[test]
    fn zero_cfg_is_rejected() {
        let err = resolve(
            InpaintingRequest {
                prompt: "a key".into(),
                cfg_scale: Some(0.0),
                ..Default::default()
            },
            "m",
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn denoise_out_of_range_is_rejected() {
        let err = resolve(
            InpaintingRequest {
                prompt: "a key".into(),
                denoise: Some(1.5),
                ..Default::default()
            },
            "m",
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}
