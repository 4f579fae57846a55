//! Service configuration loaded from environment variables.
//!
//! All fields have defaults suitable for a single-machine install where
//! both backends live under `$HOME/ai-services`. Override via the
//! environment or a `.env` file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Default HTTP base URL of the node-graph backend (ComfyUI).
pub const DEFAULT_COMFYUI_API_URL: &str = "http://127.0.0.1:8188";

/// Default HTTP base URL of the web UI backend (Stable Diffusion WebUI).
pub const DEFAULT_WEBUI_API_URL: &str = "http://127.0.0.1:7860";

/// Checkpoint used when a tool call does not name one.
pub const DEFAULT_MODEL: &str = "Counterfeit-V3.0_fp16.safetensors";

/// Number of parent directories of the executable searched for `.env`.
const DOTENV_PARENT_DEPTH: usize = 2;

/// Resolved configuration for the whole service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// ComfyUI HTTP base URL (no trailing slash).
    pub comfyui_api_url: String,
    /// WebUI HTTP base URL (no trailing slash).
    pub webui_api_url: String,
    /// Directory generated images are delivered to.
    pub output_dir: PathBuf,
    /// ComfyUI install root (contains `models/checkpoints`).
    pub comfyui_path: PathBuf,
    /// ComfyUI's own output directory, the source for output relocation.
    pub comfyui_output_dir: PathBuf,
    /// ComfyUI's image input directory, where reference and mask images
    /// are staged before a workflow references them.
    pub comfyui_input_dir: PathBuf,
    /// Script that starts ComfyUI in the background.
    pub comfyui_script: PathBuf,
    /// Script that starts WebUI in the background.
    pub webui_script: PathBuf,
    /// Checkpoint used when a request does not specify a model.
    pub default_model: String,
    /// Wall-clock limit for one ComfyUI job.
    pub generation_timeout: Duration,
    /// How long to wait for ComfyUI to become healthy after launch.
    pub comfyui_startup_timeout: Duration,
    /// How long to wait for WebUI to become healthy after launch.
    pub webui_startup_timeout: Duration,
    /// Timeout for health probes and other short API calls.
    pub api_request_timeout: Duration,
    /// Timeout for WebUI generation requests (synchronous on the server).
    pub webui_request_timeout: Duration,
    /// Interval between `/history` polls.
    pub poll_interval: Duration,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default                                  |
    /// |--------------------------------|------------------------------------------|
    /// | `COMFYUI_API_URL`              | `http://127.0.0.1:8188`                  |
    /// | `WEBUI_API_URL`                | `http://127.0.0.1:7860`                  |
    /// | `OUTPUT_DIR`                   | `$HOME/ai-services/ComfyUI/output`       |
    /// | `COMFYUI_PATH`                 | `$HOME/ai-services/ComfyUI/ComfyUI`      |
    /// | `COMFYUI_OUTPUT_DIR`           | `$COMFYUI_PATH/output`                   |
    /// | `COMFYUI_INPUT_DIR`            | `$COMFYUI_PATH/input`                    |
    /// | `SCRIPTS_DIR`                  | `./scripts`                              |
    /// | `COMFYUI_SCRIPT`               | `$SCRIPTS_DIR/start_comfyui.sh`          |
    /// | `WEBUI_SCRIPT`                 | `$SCRIPTS_DIR/start_webui.sh`            |
    /// | `DEFAULT_MODEL`                | `Counterfeit-V3.0_fp16.safetensors`      |
    /// | `GENERATION_TIMEOUT_SECS`      | `300`                                    |
    /// | `COMFYUI_STARTUP_TIMEOUT_SECS` | `45`                                     |
    /// | `WEBUI_STARTUP_TIMEOUT_SECS`   | `30`                                     |
    /// | `API_REQUEST_TIMEOUT_MS`       | `3000`                                   |
    /// | `WEBUI_REQUEST_TIMEOUT_SECS`   | `120`                                    |
    /// | `POLL_INTERVAL_MS`             | `2000`                                   |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let services_root = home.join("ai-services").join("ComfyUI");

        let comfyui_api_url = trim_url(
            lookup("COMFYUI_API_URL").unwrap_or_else(|| DEFAULT_COMFYUI_API_URL.into()),
        );
        let webui_api_url = trim_url(
            lookup("WEBUI_API_URL").unwrap_or_else(|| DEFAULT_WEBUI_API_URL.into()),
        );

        let output_dir = path_or(&lookup, "OUTPUT_DIR", || services_root.join("output"));
        let comfyui_path = path_or(&lookup, "COMFYUI_PATH", || services_root.join("ComfyUI"));
        let comfyui_output_dir =
            path_or(&lookup, "COMFYUI_OUTPUT_DIR", || comfyui_path.join("output"));
        let comfyui_input_dir =
            path_or(&lookup, "COMFYUI_INPUT_DIR", || comfyui_path.join("input"));

        let scripts_dir = path_or(&lookup, "SCRIPTS_DIR", || PathBuf::from("scripts"));
        let comfyui_script =
            path_or(&lookup, "COMFYUI_SCRIPT", || scripts_dir.join("start_comfyui.sh"));
        let webui_script = path_or(&lookup, "WEBUI_SCRIPT", || scripts_dir.join("start_webui.sh"));

        let default_model = lookup("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());

        Ok(Self {
            comfyui_api_url,
            webui_api_url,
            output_dir,
            comfyui_path,
            comfyui_output_dir,
            comfyui_input_dir,
            comfyui_script,
            webui_script,
            default_model,
            generation_timeout: Duration::from_secs(parse_or(
                &lookup,
                "GENERATION_TIMEOUT_SECS",
                300,
            )?),
            comfyui_startup_timeout: Duration::from_secs(parse_or(
                &lookup,
                "COMFYUI_STARTUP_TIMEOUT_SECS",
                45,
            )?),
            webui_startup_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WEBUI_STARTUP_TIMEOUT_SECS",
                30,
            )?),
            api_request_timeout: Duration::from_millis(parse_or(
                &lookup,
                "API_REQUEST_TIMEOUT_MS",
                3000,
            )?),
            webui_request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WEBUI_REQUEST_TIMEOUT_SECS",
                120,
            )?),
            poll_interval: Duration::from_millis(parse_or(&lookup, "POLL_INTERVAL_MS", 2000)?),
        })
    }

    /// Directory ComfyUI loads checkpoints from.
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.comfyui_path.join("models").join("checkpoints")
    }
}

/// Load a `.env` file, trying the usual locations in order.
///
/// First walks up from the current directory (the `dotenvy` default),
/// then looks next to the executable and in its parent directories.
/// Returns the path of the file that was loaded, if any.
pub fn load_dotenv() -> Option<PathBuf> {
    if let Ok(path) = dotenvy::dotenv() {
        return Some(path);
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))?;

    for dir in exe_dir.ancestors().take(DOTENV_PARENT_DEPTH + 1) {
        let candidate = dir.join(".env");
        if dotenvy::from_path(&candidate).is_ok() {
            return Some(candidate);
        }
    }

    None
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn path_or<F, D>(lookup: &F, key: &str, default: D) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> PathBuf,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default)
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| CoreError::Config {
            key,
            message: format!("'{raw}' is not valid: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup_from(&[("HOME", "/home/artist")])).unwrap();

        assert_eq!(config.comfyui_api_url, "http://127.0.0.1:8188");
        assert_eq!(config.webui_api_url, "http://127.0.0.1:7860");
        assert_eq!(
            config.output_dir,
            PathBuf::from("/home/artist/ai-services/ComfyUI/output")
        );
        assert_eq!(
            config.comfyui_output_dir,
            PathBuf::from("/home/artist/ai-services/ComfyUI/ComfyUI/output")
        );
        assert_eq!(
            config.comfyui_input_dir,
            PathBuf::from("/home/artist/ai-services/ComfyUI/ComfyUI/input")
        );
        assert_eq!(config.comfyui_script, PathBuf::from("scripts/start_comfyui.sh"));
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.generation_timeout, Duration::from_secs(300));
        assert_eq!(config.comfyui_startup_timeout, Duration::from_secs(45));
        assert_eq!(config.webui_startup_timeout, Duration::from_secs(30));
        assert_eq!(config.api_request_timeout, Duration::from_millis(3000));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("COMFYUI_API_URL", "http://gpu-box:8188/"),
            ("OUTPUT_DIR", "/srv/out"),
            ("COMFYUI_PATH", "/opt/comfy"),
            ("SCRIPTS_DIR", "/opt/scripts"),
            ("GENERATION_TIMEOUT_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.comfyui_api_url, "http://gpu-box:8188");
        assert_eq!(config.output_dir, PathBuf::from("/srv/out"));
        assert_eq!(config.comfyui_output_dir, PathBuf::from("/opt/comfy/output"));
        assert_eq!(
            config.checkpoints_dir(),
            PathBuf::from("/opt/comfy/models/checkpoints")
        );
        assert_eq!(config.webui_script, PathBuf::from("/opt/scripts/start_webui.sh"));
        assert_eq!(config.generation_timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let result = AppConfig::from_lookup(lookup_from(&[("POLL_INTERVAL_MS", "soon")]));
        assert_matches!(result, Err(CoreError::Config { key: "POLL_INTERVAL_MS", .. }));
    }

    #[test]
    fn empty_path_falls_back_to_default() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("HOME", "/h"), ("OUTPUT_DIR", "  ")])).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/h/ai-services/ComfyUI/output"));
    }
}
