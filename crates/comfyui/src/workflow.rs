//! Workflow graph model and builder.
//!
//! A [`Workflow`] is the JSON object ComfyUI expects under `prompt` in
//! `POST /prompt`: node ids mapped to `{ "class_type", "inputs" }`, where
//! an input is either a literal or a `["<node id>", <slot>]` link to
//! another node's output.
//!
//! [`WorkflowBuilder`] allocates ids sequentially and hands back typed
//! output references, so a link can only point at a node that already
//! exists and only where that kind of value is accepted.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// A node's input: either a literal value or a link to another output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Input {
    /// `["<node id>", <slot>]`
    Link(String, u32),
    Literal(Value),
}

impl Input {
    fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }
}

/// One processing node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub class_type: String,
    pub inputs: BTreeMap<String, Input>,
}

/// A complete graph, serialized as ComfyUI's node map.
///
/// Nodes serialize in insertion order, which is also id order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workflow {
    nodes: Vec<(String, Node)>,
}

impl Workflow {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|(k, _)| k == id).map(|(_, n)| n)
    }

    /// Iterate `(id, node)` pairs in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(k, n)| (k.as_str(), n))
    }

    /// Ids of every node with the given class, in id order.
    pub fn ids_of(&self, class_type: &str) -> Vec<&str> {
        self.nodes()
            .filter(|(_, n)| n.class_type == class_type)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn to_json(&self) -> Value {
        // A map of strings to plain structs cannot fail to serialize.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for Workflow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len()))?;
        for (id, node) in &self.nodes {
            map.serialize_entry(id, node)?;
        }
        map.end()
    }
}

/// Output slot of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Output {
    node: String,
    slot: u32,
}

impl From<&Output> for Input {
    fn from(o: &Output) -> Self {
        Input::Link(o.node.clone(), o.slot)
    }
}

macro_rules! output_ref {
    ($($(#[$doc:meta])* $name:ident;)*) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub struct $name(Output);

            impl $name {
                /// Id of the producing node.
                pub fn node_id(&self) -> &str {
                    &self.0.node
                }
            }
        )*
    };
}

output_ref! {
    /// Diffusion model output.
    ModelRef;
    /// Text encoder output.
    ClipRef;
    /// VAE output.
    VaeRef;
    /// Encoded prompt.
    ConditioningRef;
    /// Latent image batch.
    LatentRef;
    /// Decoded or loaded pixel image.
    ImageRef;
    /// Single-channel mask.
    MaskRef;
    /// Loaded ControlNet model.
    ControlNetRef;
}

/// Outputs of `CheckpointLoaderSimple`.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub model: ModelRef,
    pub clip: ClipRef,
    pub vae: VaeRef,
}

/// KSampler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub seed: u64,
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub denoise: f64,
}

/// Sequential graph builder.
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node and return its id.
    fn add(&mut self, class_type: &str, inputs: Vec<(&str, Input)>) -> String {
        let id = (self.workflow.nodes.len() + 1).to_string();
        let node = Node {
            class_type: class_type.to_string(),
            inputs: inputs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.workflow.nodes.push((id.clone(), node));
        id
    }

    fn out(node: &str, slot: u32) -> Output {
        Output {
            node: node.to_string(),
            slot,
        }
    }

    // -----------------------------------------------------------------------
    // Loaders
    // -----------------------------------------------------------------------

    pub fn checkpoint(&mut self, ckpt_name: &str) -> Checkpoint {
        let id = self.add(
            "CheckpointLoaderSimple",
            vec![("ckpt_name", Input::literal(ckpt_name))],
        );
        Checkpoint {
            model: ModelRef(Self::out(&id, 0)),
            clip: ClipRef(Self::out(&id, 1)),
            vae: VaeRef(Self::out(&id, 2)),
        }
    }

    /// `LoraLoader` applied to the same strength for model and text encoder.
    pub fn lora(
        &mut self,
        model: &ModelRef,
        clip: &ClipRef,
        lora_name: &str,
        strength: f64,
    ) -> (ModelRef, ClipRef) {
        let id = self.add(
            "LoraLoader",
            vec![
                ("model", (&model.0).into()),
                ("clip", (&clip.0).into()),
                ("lora_name", Input::literal(lora_name)),
                ("strength_model", Input::literal(strength)),
                ("strength_clip", Input::literal(strength)),
            ],
        );
        (ModelRef(Self::out(&id, 0)), ClipRef(Self::out(&id, 1)))
    }

    /// `LoadImage` from the backend's input directory.
    pub fn load_image(&mut self, image: &str) -> ImageRef {
        let id = self.add("LoadImage", vec![("image", Input::literal(image))]);
        ImageRef(Self::out(&id, 0))
    }

    /// `LoadImageMask` reading one colour channel as the mask.
    pub fn load_image_mask(&mut self, image: &str, channel: &str) -> MaskRef {
        let id = self.add(
            "LoadImageMask",
            vec![
                ("image", Input::literal(image)),
                ("channel", Input::literal(channel)),
            ],
        );
        MaskRef(Self::out(&id, 0))
    }

    pub fn controlnet_loader(&mut self, control_net_name: &str) -> ControlNetRef {
        let id = self.add(
            "ControlNetLoader",
            vec![("control_net_name", Input::literal(control_net_name))],
        );
        ControlNetRef(Self::out(&id, 0))
    }

    // -----------------------------------------------------------------------
    // Conditioning
    // -----------------------------------------------------------------------

    pub fn text_encode(&mut self, clip: &ClipRef, text: &str) -> ConditioningRef {
        let id = self.add(
            "CLIPTextEncode",
            vec![("text", Input::literal(text)), ("clip", (&clip.0).into())],
        );
        ConditioningRef(Self::out(&id, 0))
    }

    pub fn controlnet_apply(
        &mut self,
        conditioning: &ConditioningRef,
        control_net: &ControlNetRef,
        image: &ImageRef,
        strength: f64,
    ) -> ConditioningRef {
        let id = self.add(
            "ControlNetApply",
            vec![
                ("conditioning", (&conditioning.0).into()),
                ("control_net", (&control_net.0).into()),
                ("image", (&image.0).into()),
                ("strength", Input::literal(strength)),
            ],
        );
        ConditioningRef(Self::out(&id, 0))
    }

    // -----------------------------------------------------------------------
    // Preprocessors
    // -----------------------------------------------------------------------

    pub fn canny(&mut self, image: &ImageRef, low_threshold: u32, high_threshold: u32) -> ImageRef {
        let id = self.add(
            "CannyEdgePreprocessor",
            vec![
                ("image", (&image.0).into()),
                ("low_threshold", Input::literal(low_threshold)),
                ("high_threshold", Input::literal(high_threshold)),
            ],
        );
        ImageRef(Self::out(&id, 0))
    }

    /// MiDaS depth map at the given preprocessor resolution.
    pub fn depth_map(&mut self, image: &ImageRef, resolution: u32) -> ImageRef {
        let id = self.add(
            "MiDaS-DepthMapPreprocessor",
            vec![
                ("image", (&image.0).into()),
                ("a", Input::literal(std::f64::consts::TAU)),
                ("bg_threshold", Input::literal(0.1)),
                ("resolution", Input::literal(resolution)),
            ],
        );
        ImageRef(Self::out(&id, 0))
    }

    // -----------------------------------------------------------------------
    // Latents
    // -----------------------------------------------------------------------

    pub fn empty_latent(&mut self, width: u32, height: u32) -> LatentRef {
        let id = self.add(
            "EmptyLatentImage",
            vec![
                ("width", Input::literal(width)),
                ("height", Input::literal(height)),
                ("batch_size", Input::literal(1)),
            ],
        );
        LatentRef(Self::out(&id, 0))
    }

    pub fn ksampler(
        &mut self,
        settings: &SamplerSettings,
        model: &ModelRef,
        positive: &ConditioningRef,
        negative: &ConditioningRef,
        latent: &LatentRef,
    ) -> LatentRef {
        let id = self.add(
            "KSampler",
            vec![
                ("seed", Input::literal(settings.seed)),
                ("steps", Input::literal(settings.steps)),
                ("cfg", Input::literal(settings.cfg)),
                ("sampler_name", Input::literal(settings.sampler_name.as_str())),
                ("scheduler", Input::literal(settings.scheduler.as_str())),
                ("denoise", Input::literal(settings.denoise)),
                ("model", (&model.0).into()),
                ("positive", (&positive.0).into()),
                ("negative", (&negative.0).into()),
                ("latent_image", (&latent.0).into()),
            ],
        );
        LatentRef(Self::out(&id, 0))
    }

    pub fn latent_upscale_by(&mut self, samples: &LatentRef, method: &str, scale_by: f64) -> LatentRef {
        let id = self.add(
            "LatentUpscaleBy",
            vec![
                ("upscale_method", Input::literal(method)),
                ("scale_by", Input::literal(scale_by)),
                ("samples", (&samples.0).into()),
            ],
        );
        LatentRef(Self::out(&id, 0))
    }

    pub fn vae_decode(&mut self, samples: &LatentRef, vae: &VaeRef) -> ImageRef {
        let id = self.add(
            "VAEDecode",
            vec![("samples", (&samples.0).into()), ("vae", (&vae.0).into())],
        );
        ImageRef(Self::out(&id, 0))
    }

    pub fn vae_encode_for_inpaint(
        &mut self,
        pixels: &ImageRef,
        vae: &VaeRef,
        mask: &MaskRef,
        grow_mask_by: u32,
    ) -> LatentRef {
        let id = self.add(
            "VAEEncodeForInpaint",
            vec![
                ("pixels", (&pixels.0).into()),
                ("vae", (&vae.0).into()),
                ("mask", (&mask.0).into()),
                ("grow_mask_by", Input::literal(grow_mask_by)),
            ],
        );
        LatentRef(Self::out(&id, 0))
    }

    // -----------------------------------------------------------------------
    // Output
    // -----------------------------------------------------------------------

    /// `SaveImage` node; returns its id.
    pub fn save_image(&mut self, images: &ImageRef, filename_prefix: &str) -> String {
        self.add(
            "SaveImage",
            vec![
                ("images", (&images.0).into()),
                ("filename_prefix", Input::literal(filename_prefix)),
            ],
        )
    }

    pub fn build(self) -> Workflow {
        self.workflow
    }
}
