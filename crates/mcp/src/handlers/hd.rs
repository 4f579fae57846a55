//! `comfyui_generate_hd`: two-stage base + latent upscale + refine.

use serde_json::json;

use imagegen_comfyui::templates::{text_to_image_hd, HdParams, LoraParams, HD_PREFIX};

use super::generate::DEFAULT_LORA_STRENGTH;
use super::{check_cfg, check_steps, output_prefix, require_prompt};
use crate::error::{ToolError, ToolResult};
use crate::requests::ComfyGenerateHdRequest;
use crate::response::{summary, ToolOutput};
use crate::service::GenerationService;

pub const DEFAULT_NEGATIVE: &str = "blurry, low quality, worst quality, low resolution, distorted";
pub const BASE_RESOLUTIONS: &[&str] = &["512x512", "768x768", "1024x1024"];
const DEFAULT_BASE_RESOLUTION: &str = "768x768";
const UPSCALE_FACTORS: &[u32] = &[2, 4];
/// The refine pass samples at `cfg_scale - 1.0`.
const MIN_HD_CFG: f64 = 1.0;

const METHOD: &str = "comfyui_hd";

fn parse_resolution(value: &str) -> ToolResult<(u32, u32)> {
    let value = value.trim();
    if !BASE_RESOLUTIONS.contains(&value) {
        return Err(ToolError::invalid(format!(
            "base_resolution must be one of {}, got '{value}'",
            BASE_RESOLUTIONS.join(", ")
        )));
    }
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| ToolError::invalid(format!("Malformed resolution '{value}'")))?;
    let parse = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| ToolError::invalid(format!("Malformed resolution '{value}'")))
    };
    Ok((parse(w)?, parse(h)?))
}

pub fn build_params(req: &ComfyGenerateHdRequest, default_model: &str) -> ToolResult<HdParams> {
    require_prompt(&req.prompt)?;

    let (base_width, base_height) =
        parse_resolution(req.base_resolution.as_deref().unwrap_or(DEFAULT_BASE_RESOLUTION))?;
    let upscale_factor = req.upscale_factor.unwrap_or(2);
    if !UPSCALE_FACTORS.contains(&upscale_factor) {
        return Err(ToolError::invalid(format!(
            "upscale_factor must be 2 or 4, got {upscale_factor}"
        )));
    }

    let cfg = check_cfg(req.cfg_scale.unwrap_or(8.0))?;
    if cfg < MIN_HD_CFG {
        return Err(ToolError::invalid(format!(
            "cfg_scale must be at least {MIN_HD_CFG} for HD generation, got {cfg}"
        )));
    }

    Ok(HdParams {
        checkpoint: req.model.clone().unwrap_or_else(|| default_model.to_string()),
        prompt: req.prompt.clone(),
        negative_prompt: req
            .negative_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_NEGATIVE.into()),
        base_width,
        base_height,
        upscale_factor,
        steps: check_steps(req.steps.unwrap_or(40))?,
        cfg,
        lora: LoraParams::from_optional(
            req.lora.as_deref(),
            req.lora_strength.unwrap_or(DEFAULT_LORA_STRENGTH),
        ),
        seed: req.seed,
        filename_prefix: Some(output_prefix(req.output_name.as_deref(), HD_PREFIX)),
    })
}

pub async fn run(service: &GenerationService, req: ComfyGenerateHdRequest) -> ToolResult<ToolOutput> {
    let params = build_params(&req, &service.config().default_model)?;
    let prefix = params.filename_prefix.clone().unwrap_or_else(|| HD_PREFIX.into());

    let outcome = service
        .run_comfyui_workflow(&text_to_image_hd(&params), &prefix, METHOD)
        .await?;

    let (final_width, final_height) = params.final_size();
    let text = summary(
        "HD image generated with ComfyUI",
        &[
            ("File", outcome.output_path.display().to_string()),
            ("Prompt", params.prompt.clone()),
            (
                "Resolution",
                format!(
                    "{}x{} -> {final_width}x{final_height}",
                    params.base_width, params.base_height
                ),
            ),
            ("Upscale factor", format!("{}x", params.upscale_factor)),
            (
                "Steps",
                format!(
                    "{} (base {}, refine {})",
                    params.steps,
                    params.base_steps(),
                    params.refine_steps()
                ),
            ),
        ],
    );
    let data = json!({
        "result": outcome,
        "settings": {
            "model": params.checkpoint,
            "base_resolution": format!("{}x{}", params.base_width, params.base_height),
            "final_resolution": format!("{final_width}x{final_height}"),
            "upscale_factor": params.upscale_factor,
            "steps": params.steps,
            "base_steps": params.base_steps(),
            "refine_steps": params.refine_steps(),
            "cfg_scale": params.cfg,
            "lora": params.lora.as_ref().map(|l| l.name.clone()),
        },
    });
    Ok(ToolOutput::new(text, &data))
}
