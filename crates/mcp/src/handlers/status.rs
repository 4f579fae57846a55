//! `check_services`: health of both backends without launching them.

use serde::Serialize;

use crate::error::ToolResult;
use crate::response::{summary, ToolOutput};
use crate::service::GenerationService;

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub name: &'static str,
    pub url: String,
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct ServicesStatus {
    pub comfyui: BackendStatus,
    pub webui: BackendStatus,
    pub output_dir: String,
}

fn label(running: bool) -> &'static str {
    if running {
        "running"
    } else {
        "not running"
    }
}

pub async fn run(service: &GenerationService) -> ToolResult<ToolOutput> {
    let (comfyui_running, webui_running) =
        tokio::join!(service.comfyui_running(), service.webui_running());

    let status = ServicesStatus {
        comfyui: BackendStatus {
            name: "ComfyUI",
            url: service.comfyui().api_url().to_string(),
            running: comfyui_running,
        },
        webui: BackendStatus {
            name: "WebUI",
            url: service.webui().api_url().to_string(),
            running: webui_running,
        },
        output_dir: service.config().output_dir.display().to_string(),
    };

    let text = summary(
        "Service status",
        &[
            (
                "ComfyUI",
                format!("{} ({})", label(status.comfyui.running), status.comfyui.url),
            ),
            (
                "WebUI",
                format!("{} ({})", label(status.webui.running), status.webui.url),
            ),
            ("Output directory", status.output_dir.clone()),
        ],
    );
    Ok(ToolOutput::new(text, &status))
}
