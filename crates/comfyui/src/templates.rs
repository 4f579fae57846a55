//! Workflow templates, one per generation mode.
//!
//! Every template is a pure function from parameters to a [`Workflow`].
//! The only nondeterminism is the sampler seed, drawn at random when the
//! caller does not supply one.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::workflow::{Checkpoint, ClipRef, ModelRef, SamplerSettings, Workflow, WorkflowBuilder};

/// Exclusive upper bound for random seeds.
pub const SEED_RANGE: u64 = 1_000_000;

pub const TXT2IMG_PREFIX: &str = "comfyui_txt2img";
pub const HD_PREFIX: &str = "ComfyUI_HD";
pub const INPAINT_PREFIX: &str = "comfyui_inpainting";
pub const CONTROLNET_PREFIX: &str = "ControlNet_Reference";

const HD_PROMPT_PREFIX: &str = "masterpiece, best quality, ultra detailed, 8k, photorealistic";
const HD_NEGATIVE_SUFFIX: &str = ", low resolution, pixelated, jpeg artifacts";
const HD_SAMPLER: &str = "dpmpp_2m";
const HD_SCHEDULER: &str = "karras";
const HD_REFINE_DENOISE: f64 = 0.4;

const INPAINT_SAMPLER: &str = "dpmpp_2m";
const INPAINT_SCHEDULER: &str = "karras";
const INPAINT_GROW_MASK_BY: u32 = 6;

const CONTROLNET_PROMPT_SUFFIX: &str = ", same style, same lighting, same perspective";
const CONTROLNET_CANNY_MODEL: &str = "control_v11p_sd15_canny.pth";
const CONTROLNET_DEPTH_MODEL: &str = "control_v11f1p_sd15_depth.pth";
const CONTROLNET_SIZE: u32 = 512;

/// Use `seed` or draw one from `[0, SEED_RANGE)`.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| rand::rng().random_range(0..SEED_RANGE))
}

/// Optional LoRA adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraParams {
    pub name: String,
    pub strength: f64,
}

impl LoraParams {
    /// `None` when `name` is missing or blank.
    pub fn from_optional(name: Option<&str>, strength: f64) -> Option<Self> {
        name.map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| Self {
                name: n.to_string(),
                strength,
            })
    }
}

/// Checkpoint plus optional LoRA; returns the model and text encoder
/// every downstream node should use.
fn load_model(
    b: &mut WorkflowBuilder,
    checkpoint: &str,
    lora: Option<&LoraParams>,
) -> (Checkpoint, ModelRef, ClipRef) {
    let ckpt = b.checkpoint(checkpoint);
    let (model, clip) = match lora {
        Some(l) => b.lora(&ckpt.model, &ckpt.clip, &l.name, l.strength),
        None => (ckpt.model.clone(), ckpt.clip.clone()),
    };
    (ckpt, model, clip)
}

fn prefix_or<'a>(prefix: &'a Option<String>, default: &'a str) -> &'a str {
    prefix
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Text to image
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TextToImageParams {
    pub checkpoint: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    pub sampler: String,
    pub scheduler: String,
    pub lora: Option<LoraParams>,
    pub seed: Option<u64>,
    pub filename_prefix: Option<String>,
}

pub fn text_to_image(p: &TextToImageParams) -> Workflow {
    let mut b = WorkflowBuilder::new();
    let (ckpt, model, clip) = load_model(&mut b, &p.checkpoint, p.lora.as_ref());
    let positive = b.text_encode(&clip, &p.prompt);
    let negative = b.text_encode(&clip, &p.negative_prompt);
    let latent = b.empty_latent(p.width, p.height);
    let sampled = b.ksampler(
        &SamplerSettings {
            seed: resolve_seed(p.seed),
            steps: p.steps,
            cfg: p.cfg,
            sampler_name: p.sampler.clone(),
            scheduler: p.scheduler.clone(),
            denoise: 1.0,
        },
        &model,
        &positive,
        &negative,
        &latent,
    );
    let image = b.vae_decode(&sampled, &ckpt.vae);
    b.save_image(&image, prefix_or(&p.filename_prefix, TXT2IMG_PREFIX));
    b.build()
}

// ---------------------------------------------------------------------------
// Two-stage HD
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HdParams {
    pub checkpoint: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub base_width: u32,
    pub base_height: u32,
    pub upscale_factor: u32,
    pub steps: u32,
    pub cfg: f64,
    pub lora: Option<LoraParams>,
    pub seed: Option<u64>,
    pub filename_prefix: Option<String>,
}

impl HdParams {
    /// Steps of the base pass (70%, at least one).
    pub fn base_steps(&self) -> u32 {
        (self.steps * 7 / 10).max(1)
    }

    /// Steps of the refine pass (30%, at least one).
    pub fn refine_steps(&self) -> u32 {
        (self.steps * 3 / 10).max(1)
    }

    pub fn final_size(&self) -> (u32, u32) {
        (
            self.base_width * self.upscale_factor,
            self.base_height * self.upscale_factor,
        )
    }
}

pub fn text_to_image_hd(p: &HdParams) -> Workflow {
    let mut b = WorkflowBuilder::new();
    let (ckpt, model, clip) = load_model(&mut b, &p.checkpoint, p.lora.as_ref());
    let positive = b.text_encode(&clip, &format!("{HD_PROMPT_PREFIX}, {}", p.prompt));
    let negative = b.text_encode(&clip, &format!("{}{HD_NEGATIVE_SUFFIX}", p.negative_prompt));
    let latent = b.empty_latent(p.base_width, p.base_height);
    let seed = resolve_seed(p.seed);

    let base = b.ksampler(
        &SamplerSettings {
            seed,
            steps: p.base_steps(),
            cfg: p.cfg,
            sampler_name: HD_SAMPLER.into(),
            scheduler: HD_SCHEDULER.into(),
            denoise: 1.0,
        },
        &model,
        &positive,
        &negative,
        &latent,
    );
    let upscaled = b.latent_upscale_by(&base, "nearest-exact", f64::from(p.upscale_factor));
    let refined = b.ksampler(
        &SamplerSettings {
            seed,
            steps: p.refine_steps(),
            cfg: p.cfg - 1.0,
            sampler_name: HD_SAMPLER.into(),
            scheduler: HD_SCHEDULER.into(),
            denoise: HD_REFINE_DENOISE,
        },
        &model,
        &positive,
        &negative,
        &upscaled,
    );
    let image = b.vae_decode(&refined, &ckpt.vae);
    b.save_image(&image, prefix_or(&p.filename_prefix, HD_PREFIX));
    b.build()
}

// ---------------------------------------------------------------------------
// Inpainting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InpaintParams {
    pub checkpoint: String,
    /// Reference image name inside the backend's input directory.
    pub image: String,
    /// Mask image name inside the backend's input directory.
    pub mask: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg: f64,
    pub denoise: f64,
    pub seed: Option<u64>,
    pub filename_prefix: Option<String>,
}

pub fn inpainting(p: &InpaintParams) -> Workflow {
    let mut b = WorkflowBuilder::new();
    let ckpt = b.checkpoint(&p.checkpoint);
    let pixels = b.load_image(&p.image);
    let mask = b.load_image_mask(&p.mask, "red");
    let positive = b.text_encode(&ckpt.clip, &p.prompt);
    let negative = b.text_encode(&ckpt.clip, &p.negative_prompt);
    let latent = b.vae_encode_for_inpaint(&pixels, &ckpt.vae, &mask, INPAINT_GROW_MASK_BY);
    let sampled = b.ksampler(
        &SamplerSettings {
            seed: resolve_seed(p.seed),
            steps: p.steps,
            cfg: p.cfg,
            sampler_name: INPAINT_SAMPLER.into(),
            scheduler: INPAINT_SCHEDULER.into(),
            denoise: p.denoise,
        },
        &ckpt.model,
        &positive,
        &negative,
        &latent,
    );
    let image = b.vae_decode(&sampled, &ckpt.vae);
    b.save_image(&image, prefix_or(&p.filename_prefix, INPAINT_PREFIX));
    b.build()
}

// ---------------------------------------------------------------------------
// ControlNet reference
// ---------------------------------------------------------------------------

/// Structure-preserving ControlNet variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlNetType {
    Canny,
    Depth,
    CannyDepth,
}

impl ControlNetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canny => "canny",
            Self::Depth => "depth",
            Self::CannyDepth => "canny+depth",
        }
    }
}

impl fmt::Display for ControlNetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlNetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canny" => Ok(Self::Canny),
            "depth" => Ok(Self::Depth),
            "canny+depth" | "canny_depth" => Ok(Self::CannyDepth),
            other => Err(format!(
                "Unknown controlnet_type '{other}' (expected canny, depth or canny+depth)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlNetParams {
    pub checkpoint: String,
    /// Reference image name inside the backend's input directory.
    pub image: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub control_type: ControlNetType,
    pub strength: f64,
    pub steps: u32,
    pub cfg: f64,
    pub seed: Option<u64>,
    pub filename_prefix: Option<String>,
}

pub fn controlnet_reference(p: &ControlNetParams) -> Workflow {
    let mut b = WorkflowBuilder::new();
    let ckpt = b.checkpoint(&p.checkpoint);
    let reference = b.load_image(&p.image);
    let mut positive = b.text_encode(&ckpt.clip, &format!("{}{CONTROLNET_PROMPT_SUFFIX}", p.prompt));
    let negative = b.text_encode(&ckpt.clip, &p.negative_prompt);

    if matches!(p.control_type, ControlNetType::Canny | ControlNetType::CannyDepth) {
        let net = b.controlnet_loader(CONTROLNET_CANNY_MODEL);
        let edges = b.canny(&reference, 100, 200);
        positive = b.controlnet_apply(&positive, &net, &edges, p.strength);
    }
    if matches!(p.control_type, ControlNetType::Depth | ControlNetType::CannyDepth) {
        let net = b.controlnet_loader(CONTROLNET_DEPTH_MODEL);
        let depth = b.depth_map(&reference, CONTROLNET_SIZE);
        positive = b.controlnet_apply(&positive, &net, &depth, p.strength);
    }

    let latent = b.empty_latent(CONTROLNET_SIZE, CONTROLNET_SIZE);
    let sampled = b.ksampler(
        &SamplerSettings {
            seed: resolve_seed(p.seed),
            steps: p.steps,
            cfg: p.cfg,
            sampler_name: "dpmpp_2m".into(),
            scheduler: "karras".into(),
            denoise: 1.0,
        },
        &ckpt.model,
        &positive,
        &negative,
        &latent,
    );
    let image = b.vae_decode(&sampled, &ckpt.vae);
    b.save_image(&image, prefix_or(&p.filename_prefix, CONTROLNET_PREFIX));
    b.build()
}
