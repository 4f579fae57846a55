//! `comfyui_generate`: text to image on ComfyUI.

use serde_json::json;

use imagegen_comfyui::templates::{text_to_image, LoraParams, TextToImageParams, TXT2IMG_PREFIX};
use imagegen_core::preset::{resolve_settings, PresetSettings, QualityPreset, SettingOverrides};

use super::{check_cfg, check_dimensions, check_steps, output_prefix, require_prompt};
use crate::error::ToolResult;
use crate::requests::ComfyGenerateRequest;
use crate::response::{summary, ToolOutput};
use crate::service::GenerationService;

pub const DEFAULT_NEGATIVE: &str = "blurry, low quality, worst quality, low resolution";
pub const DEFAULT_LORA_STRENGTH: f64 = 0.7;

pub const METHOD: &str = "comfyui_txt2img";

/// Tool defaults used when neither an argument nor a preset applies.
pub fn tool_defaults() -> PresetSettings {
    PresetSettings {
        steps: 30,
        cfg: 8.0,
        sampler: "dpmpp_2m".into(),
        scheduler: "karras".into(),
        width: 1024,
        height: 1024,
    }
}

/// Resolve every default of `req` into template parameters.
pub fn build_params(
    req: &ComfyGenerateRequest,
    default_model: &str,
) -> ToolResult<(TextToImageParams, Option<&'static str>)> {
    require_prompt(&req.prompt)?;

    let overrides = SettingOverrides {
        steps: req.steps,
        cfg: req.cfg_scale,
        sampler: req.sampler.clone(),
        scheduler: req.scheduler.clone(),
        width: req.width,
        height: req.height,
    };
    let settings = resolve_settings(req.quality_preset.as_deref(), &overrides, &tool_defaults());
    check_steps(settings.steps)?;
    check_cfg(settings.cfg)?;
    check_dimensions(settings.width, settings.height)?;

    let preset = req
        .quality_preset
        .as_deref()
        .map(|name| QualityPreset::from_name(name).name());

    let params = TextToImageParams {
        checkpoint: req.model.clone().unwrap_or_else(|| default_model.to_string()),
        prompt: req.prompt.clone(),
        negative_prompt: req
            .negative_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_NEGATIVE.into()),
        width: settings.width,
        height: settings.height,
        steps: settings.steps,
        cfg: settings.cfg,
        sampler: settings.sampler,
        scheduler: settings.scheduler,
        lora: LoraParams::from_optional(
            req.lora.as_deref(),
            req.lora_strength.unwrap_or(DEFAULT_LORA_STRENGTH),
        ),
        seed: req.seed,
        filename_prefix: Some(output_prefix(req.output_name.as_deref(), TXT2IMG_PREFIX)),
    };
    Ok((params, preset))
}

pub async fn run(service: &GenerationService, req: ComfyGenerateRequest) -> ToolResult<ToolOutput> {
    let (params, preset) = build_params(&req, &service.config().default_model)?;
    let prefix = params
        .filename_prefix
        .clone()
        .unwrap_or_else(|| TXT2IMG_PREFIX.into());

    let outcome = service
        .run_comfyui_workflow(&text_to_image(&params), &prefix, METHOD)
        .await?;

    let text = summary(
        "Image generated with ComfyUI",
        &[
            ("File", outcome.output_path.display().to_string()),
            ("Prompt", params.prompt.clone()),
            ("Model", params.checkpoint.clone()),
            (
                "LoRA",
                params
                    .lora
                    .as_ref()
                    .map(|l| format!("{} ({})", l.name, l.strength))
                    .unwrap_or_else(|| "none".into()),
            ),
            ("Preset", preset.unwrap_or("none").to_string()),
            ("Size", format!("{}x{}", params.width, params.height)),
            (
                "Sampling",
                format!(
                    "{} steps, cfg {}, {}/{}",
                    params.steps, params.cfg, params.sampler, params.scheduler
                ),
            ),
        ],
    );
    let data = json!({
        "result": outcome,
        "settings": {
            "model": params.checkpoint,
            "steps": params.steps,
            "cfg_scale": params.cfg,
            "sampler": params.sampler,
            "scheduler": params.scheduler,
            "width": params.width,
            "height": params.height,
            "quality_preset": preset,
            "lora": params.lora.as_ref().map(|l| json!({ "name": l.name, "strength": l.strength })),
        },
    });
    Ok(ToolOutput::new(text, &data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> ComfyGenerateRequest {
        ComfyGenerateRequest {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply_without_preset() {
        let (p, preset) = build_params(&request("a door"), "base.safetensors").unwrap();
        assert_eq!(preset, None);
        assert_eq!(p.steps, 30);
        assert_eq!(p.cfg, 8.0);
        assert_eq!((p.width, p.height), (1024, 1024));
        assert_eq!(p.checkpoint, "base.safetensors");
        assert_eq!(p.negative_prompt, DEFAULT_NEGATIVE);
        assert_eq!(p.filename_prefix.as_deref(), Some(TXT2IMG_PREFIX));
        assert!(p.lora.is_none());
    }

    #[test]
    fn preset_fills_unset_fields_only() {
        let req = ComfyGenerateRequest {
            steps: Some(12),
            quality_preset: Some("draft".into()),
            ..request("a door")
        };
        let (p, preset) = build_params(&req, "m").unwrap();
        assert_eq!(preset, Some("draft"));
        assert_eq!(p.steps, 12);
        assert_eq!(p.cfg, 6.0);
        assert_eq!(p.sampler, "euler");
        assert_eq!((p.width, p.height), (512, 512));
    }

    #[test]
    fn unknown_preset_uses_high() {
        let req = ComfyGenerateRequest {
            quality_preset: Some("cinematic".into()),
            ..request("a door")
        };
        let (p, preset) = build_params(&req, "m").unwrap();
        assert_eq!(preset, Some("high"));
        assert_eq!(p.steps, 35);
    }

    #[test]
    fn lora_and_output_name() {
        let req = ComfyGenerateRequest {
            lora: Some("ink.safetensors".into()),
            output_name: Some("door.png".into()),
            ..request("a door")
        };
        let (p, _) = build_params(&req, "m").unwrap();
        let lora = p.lora.unwrap();
        assert_eq!(lora.name, "ink.safetensors");
        assert_eq!(lora.strength, DEFAULT_LORA_STRENGTH);
        assert_eq!(p.filename_prefix.as_deref(), Some("door"));
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        assert!(build_params(&request(""), "m").is_err());
        let req = ComfyGenerateRequest {
            width: Some(1001),
            ..request("a door")
        };
        assert_eq!(build_params(&req, "m").unwrap_err().code(), "INVALID_ARGUMENT");
        let req = ComfyGenerateRequest {
            cfg_scale: Some(-1.0),
            ..request("a door")
        };
        assert_eq!(build_params(&req, "m").unwrap_err().code(), "INVALID_ARGUMENT");
    }
}
