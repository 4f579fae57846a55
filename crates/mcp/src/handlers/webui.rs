//! `webui_generate`: text to image on Stable Diffusion WebUI.

use serde_json::json;

use imagegen_webui::types::{Txt2ImgRequest, DEFAULT_SAMPLER};

use super::{check_cfg, check_dimensions, check_steps, output_prefix, require_prompt};
use crate::error::ToolResult;
use crate::requests::WebuiGenerateRequest;
use crate::response::{summary, ToolOutput};
use crate::service::GenerationService;

pub const DEFAULT_NEGATIVE: &str = "blurry, low quality";
const DEFAULT_STEM: &str = "webui_generated";
const METHOD: &str = "webui_txt2img";

pub fn build_request(req: &WebuiGenerateRequest) -> ToolResult<Txt2ImgRequest> {
    require_prompt(&req.prompt)?;

    let mut body = Txt2ImgRequest::new(
        req.prompt.clone(),
        req.negative_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_NEGATIVE.into()),
    );
    body.steps = check_steps(req.steps.unwrap_or(body.steps))?;
    body.cfg_scale = check_cfg(req.cfg_scale.unwrap_or(body.cfg_scale))?;
    body.width = req.width.unwrap_or(body.width);
    body.height = req.height.unwrap_or(body.height);
    check_dimensions(body.width, body.height)?;
    body.sampler_name = req
        .sampler_name
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SAMPLER.into());
    Ok(body)
}

pub async fn run(service: &GenerationService, req: WebuiGenerateRequest) -> ToolResult<ToolOutput> {
    let body = build_request(&req)?;
    let stem = output_prefix(req.output_name.as_deref(), DEFAULT_STEM);

    let outcome = service.run_webui_txt2img(&body, &stem, METHOD).await?;

    let text = summary(
        "Image generated with WebUI",
        &[
            ("File", outcome.output_path.display().to_string()),
            ("Prompt", body.prompt.clone()),
            ("Size", format!("{}x{}", body.width, body.height)),
            ("Steps", body.steps.to_string()),
            ("Sampler", body.sampler_name.clone()),
        ],
    );
    let data = json!({
        "result": outcome,
        "settings": {
            "steps": body.steps,
            "cfg_scale": body.cfg_scale,
            "width": body.width,
            "height": body.height,
            "sampler_name": body.sampler_name,
        },
    });
    Ok(ToolOutput::new(text, &data))
}
