//! One module per tool. Handlers validate arguments, apply defaults and
//! call into [`GenerationService`](crate::service::GenerationService).

pub mod controlnet;
pub mod generate;
pub mod hd;
pub mod inpaint;
pub mod models;
pub mod outputs;
pub mod status;
pub mod webui;

use std::path::Path;

use imagegen_core::naming::sanitize_filename;
use imagegen_core::outputs::IMAGE_EXTENSIONS;

use crate::error::{ToolError, ToolResult};

const MIN_DIMENSION: u32 = 64;
const MAX_DIMENSION: u32 = 4096;
const MAX_STEPS: u32 = 150;

pub(crate) fn require_prompt(prompt: &str) -> ToolResult<()> {
    if prompt.trim().is_empty() {
        return Err(ToolError::invalid("prompt must not be empty"));
    }
    Ok(())
}

pub(crate) fn check_steps(steps: u32) -> ToolResult<u32> {
    if steps == 0 || steps > MAX_STEPS {
        return Err(ToolError::invalid(format!(
            "steps must be between 1 and {MAX_STEPS}, got {steps}"
        )));
    }
    Ok(steps)
}

pub(crate) fn check_dimensions(width: u32, height: u32) -> ToolResult<()> {
    for (name, value) in [("width", width), ("height", height)] {
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) || value % 8 != 0 {
            return Err(ToolError::invalid(format!(
                "{name} must be a multiple of 8 between {MIN_DIMENSION} and {MAX_DIMENSION}, got {value}"
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_cfg(cfg: f64) -> ToolResult<f64> {
    if !cfg.is_finite() || cfg <= 0.0 {
        return Err(ToolError::invalid(format!(
            "cfg_scale must be a positive number, got {cfg}"
        )));
    }
    Ok(cfg)
}

pub(crate) fn check_unit_range(name: &str, value: f64) -> ToolResult<f64> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ToolError::invalid(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(value)
}

/// Caller-supplied image path that must exist.
pub(crate) async fn existing_image(field: &str, path: &str) -> ToolResult<()> {
    if path.trim().is_empty() {
        return Err(ToolError::invalid(format!("{field} must not be empty")));
    }
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ToolError::invalid(format!("{field} not found: {path}")));
    }
    Ok(())
}

/// Sanitized filename prefix from an optional caller name.
///
/// A trailing image extension is dropped, since the backends append
/// their own counter and extension.
pub(crate) fn output_prefix(name: Option<&str>, default: &str) -> String {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return default.to_string();
    };
    let stem = match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) if IMAGE_EXTENSIONS.iter().any(|x| ext.eq_ignore_ascii_case(x)) => {
            &name[..name.len() - ext.len() - 1]
        }
        _ => name,
    };
    sanitize_filename(stem)
}

/// File name component of a caller path, for staging.
pub(crate) fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image.png")
}
