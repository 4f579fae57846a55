//! `comfyui_controlnet_reference`: structure-preserving variations of a
//! reference image.

use std::path::Path;

use serde_json::json;

use imagegen_comfyui::templates::{controlnet_reference, ControlNetParams, ControlNetType, CONTROLNET_PREFIX};

use super::{base_name, check_cfg, check_steps, check_unit_range, existing_image, output_prefix, require_prompt};
use crate::error::{ToolError, ToolResult};
use crate::requests::ControlNetReferenceRequest;
use crate::response::{summary, ToolOutput};
use crate::service::GenerationService;

pub const DEFAULT_NEGATIVE: &str = "blurry, low quality, different lighting, different angle";
const METHOD: &str = "comfyui_controlnet_reference";

/// Validated arguments, before the reference image is staged.
#[derive(Debug)]
struct Resolved {
    control_type: ControlNetType,
    strength: f64,
    reference_strength: f64,
    steps: u32,
    cfg: f64,
}

fn resolve(req: &ControlNetReferenceRequest) -> ToolResult<Resolved> {
    require_prompt(&req.prompt)?;
    let control_type = req
        .controlnet_type
        .as_deref()
        .unwrap_or("canny")
        .parse::<ControlNetType>()
        .map_err(ToolError::InvalidArgument)?;

    Ok(Resolved {
        control_type,
        strength: check_unit_range("canny_strength", req.canny_strength.unwrap_or(0.8))?,
        reference_strength: check_unit_range(
            "reference_strength",
            req.reference_strength.unwrap_or(0.9),
        )?,
        steps: check_steps(req.steps.unwrap_or(25))?,
        cfg: check_cfg(req.cfg_scale.unwrap_or(7.5))?,
    })
}

pub async fn run(
    service: &GenerationService,
    req: ControlNetReferenceRequest,
) -> ToolResult<ToolOutput> {
    let r = resolve(&req)?;
    existing_image("reference_image", &req.reference_image).await?;

    let staged = service
        .stage_image(Path::new(&req.reference_image), base_name(&req.reference_image))
        .await?;
    let prefix = output_prefix(req.output_name.as_deref(), CONTROLNET_PREFIX);

    let params = ControlNetParams {
        checkpoint: req
            .model
            .clone()
            .unwrap_or_else(|| service.config().default_model.clone()),
        image: staged,
        prompt: req.prompt.clone(),
        negative_prompt: req
            .negative_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_NEGATIVE.into()),
        control_type: r.control_type,
        strength: r.strength,
        steps: r.steps,
        cfg: r.cfg,
        seed: req.seed,
        filename_prefix: Some(prefix.clone()),
    };
    let outcome = service
        .run_comfyui_workflow(&controlnet_reference(&params), &prefix, METHOD)
        .await?;

    let text = summary(
        "ControlNet reference image generated",
        &[
            ("File", outcome.output_path.display().to_string()),
            ("Reference", req.reference_image.clone()),
            ("Prompt", req.prompt.clone()),
            (
                "ControlNet",
                format!("{} (strength {})", r.control_type, r.strength),
            ),
            ("Reference strength", r.reference_strength.to_string()),
            ("Steps", r.steps.to_string()),
        ],
    );
    let data = json!({
        "result": outcome,
        "settings": {
            "reference_image": req.reference_image,
            "staged_image": params.image,
            "controlnet_type": r.control_type.as_str(),
            "canny_strength": r.strength,
            "reference_strength": r.reference_strength,
            "steps": r.steps,
            "cfg_scale": r.cfg,
            "model": params.checkpoint,
        },
    });
    Ok(ToolOutput::new(text, &data))
}
