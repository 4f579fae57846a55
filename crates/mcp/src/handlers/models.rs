//! `list_models`: checkpoints known to each backend, plus WebUI samplers.
//!
//! Backends are probed, not launched. When ComfyUI is down its checkpoint
//! directory is read from disk instead.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use imagegen_core::outputs::list_checkpoints;

use crate::error::{ToolError, ToolResult};
use crate::requests::ListModelsRequest;
use crate::response::ToolOutput;
use crate::service::GenerationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceSelector {
    ComfyUI,
    WebUI,
    Both,
}

impl ServiceSelector {
    fn includes_comfyui(self) -> bool {
        matches!(self, Self::ComfyUI | Self::Both)
    }

    fn includes_webui(self) -> bool {
        matches!(self, Self::WebUI | Self::Both)
    }
}

impl FromStr for ServiceSelector {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "comfyui" => Ok(Self::ComfyUI),
            "webui" => Ok(Self::WebUI),
            "both" | "" => Ok(Self::Both),
            other => Err(ToolError::invalid(format!(
                "service must be 'comfyui', 'webui' or 'both', got '{other}'"
            ))),
        }
    }
}

/// Where a model list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Api,
    Local,
    Unavailable,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Api => "api",
            Self::Local => "local files",
            Self::Unavailable => "unavailable",
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub backend: &'static str,
    pub source: ModelSource,
    pub models: Vec<String>,
    /// Sampler names, WebUI only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samplers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelList {
    fn unavailable(backend: &'static str, error: String) -> Self {
        Self {
            backend,
            source: ModelSource::Unavailable,
            models: Vec::new(),
            samplers: Vec::new(),
            error: Some(error),
        }
    }

    fn render(&self, text: &mut String) {
        text.push_str(&format!(
            "{} ({}, {} models)",
            self.backend,
            self.source,
            self.models.len()
        ));
        if let Some(error) = &self.error {
            text.push_str(&format!(": {error}"));
        }
        text.push('\n');
        for model in &self.models {
            text.push_str(&format!("- {model}\n"));
        }
        if !self.samplers.is_empty() {
            text.push_str(&format!("Samplers: {}\n", self.samplers.join(", ")));
        }
    }
}

async fn local_checkpoints(service: &GenerationService, api_error: Option<String>) -> ModelList {
    let dir = service.config().checkpoints_dir();
    match list_checkpoints(&dir).await {
        Ok(models) => ModelList {
            backend: "ComfyUI",
            source: ModelSource::Local,
            models,
            samplers: Vec::new(),
            error: api_error,
        },
        Err(e) => ModelList::unavailable("ComfyUI", e.to_string()),
    }
}

async fn comfyui_models(service: &GenerationService) -> ModelList {
    if !service.comfyui_running().await {
        return local_checkpoints(service, None).await;
    }
    match service.comfyui().checkpoint_names().await {
        Ok(models) => ModelList {
            backend: "ComfyUI",
            source: ModelSource::Api,
            models,
            samplers: Vec::new(),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "ComfyUI model query failed, reading checkpoint directory");
            local_checkpoints(service, Some(e.to_string())).await
        }
    }
}

async fn webui_models(service: &GenerationService) -> ModelList {
    if !service.webui_running().await {
        return ModelList::unavailable("WebUI", "WebUI is not running".into());
    }
    let models = match service.webui().sd_models().await {
        Ok(models) => models,
        Err(e) => return ModelList::unavailable("WebUI", e.to_string()),
    };
    let samplers = match service.webui().samplers().await {
        Ok(samplers) => samplers.into_iter().map(|s| s.name).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "WebUI sampler query failed");
            Vec::new()
        }
    };
    ModelList {
        backend: "WebUI",
        source: ModelSource::Api,
        models: models.into_iter().map(|m| m.title).collect(),
        samplers,
        error: None,
    }
}

pub async fn run(service: &GenerationService, req: ListModelsRequest) -> ToolResult<ToolOutput> {
    let selector: ServiceSelector = req.service.as_deref().unwrap_or("both").parse()?;

    let mut lists = Vec::new();
    if selector.includes_comfyui() {
        lists.push(comfyui_models(service).await);
    }
    if selector.includes_webui() {
        lists.push(webui_models(service).await);
    }

    let mut text = String::from("Available models:\n");
    for list in &lists {
        list.render(&mut text);
    }
    text.truncate(text.trim_end().len());
    Ok(ToolOutput::new(text, &lists))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn selector_parsing() {
        assert_eq!("ComfyUI".parse::<ServiceSelector>().unwrap(), ServiceSelector::ComfyUI);
        assert_eq!(" webui ".parse::<ServiceSelector>().unwrap(), ServiceSelector::WebUI);
        assert_eq!("both".parse::<ServiceSelector>().unwrap(), ServiceSelector::Both);
        assert_matches!(
            "a1111".parse::<ServiceSelector>(),
            Err(ToolError::InvalidArgument(_))
        );
    }

    #[test]
    fn render_lists_models_and_errors() {
        let mut text = String::new();
        ModelList {
            backend: "ComfyUI",
            source: ModelSource::Local,
            models: vec!["a.safetensors".into()],
            samplers: Vec::new(),
            error: None,
        }
        .render(&mut text);
        ModelList {
            backend: "WebUI",
            source: ModelSource::Api,
            models: vec!["base [abc]".into()],
            samplers: vec!["Euler a".into(), "DPM++ 2M Karras".into()],
            error: None,
        }
        .render(&mut text);
        ModelList::unavailable("WebUI", "WebUI is not running".into()).render(&mut text);
        assert_eq!(
            text,
            "ComfyUI (local files, 1 models)\n- a.safetensors\n\
             WebUI (api, 1 models)\n- base [abc]\nSamplers: Euler a, DPM++ 2M Karras\n\
             WebUI (unavailable, 0 models): WebUI is not running\n"
        );
    }
}
