use imagegen_comfyui::api::ComfyUIApiError;
use imagegen_comfyui::poller::PollError;
use imagegen_core::error::CoreError;
use imagegen_core::fallback::FallbackError;
use imagegen_launcher::LauncherError;
use imagegen_webui::api::WebUIApiError;
use rmcp::model::{CallToolResult, Content};

/// Error type for tool handlers.
///
/// Wraps the error of every layer a tool call can fail in. The
/// dispatcher renders it as an error result prefixed with [`code`].
///
/// [`code`]: ToolError::code
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Launcher(#[from] LauncherError),

    #[error(transparent)]
    ComfyUI(#[from] ComfyUIApiError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    WebUI(#[from] WebUIApiError),

    #[error(transparent)]
    Fallback(#[from] FallbackError),

    /// A tool argument failed validation.
    #[error("{0}")]
    InvalidArgument(String),
}

/// Convenience type alias for handler return values.
pub type ToolResult<T> = Result<T, ToolError>;

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Stable machine-readable failure class.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::Core(core) => match core {
                CoreError::Config { .. } | CoreError::Validation(_) => "INVALID_ARGUMENT",
                CoreError::Io { .. } => "IO_ERROR",
            },
            ToolError::Launcher(_) => "BACKEND_UNAVAILABLE",
            ToolError::ComfyUI(e) => comfyui_code(e),
            ToolError::Poll(poll) => match poll {
                PollError::Submit(e) => comfyui_code(e),
                PollError::Execution { .. } | PollError::Failed { .. } => "GENERATION_FAILED",
                PollError::NoImages { .. } => "NO_IMAGES",
                PollError::Timeout { .. } => "TIMEOUT",
            },
            ToolError::WebUI(webui) => match webui {
                WebUIApiError::Request(e) => request_code(e),
                WebUIApiError::ApiError { .. } | WebUIApiError::Decode(_) => "UPSTREAM_ERROR",
                WebUIApiError::NoImages => "NO_IMAGES",
            },
            ToolError::Fallback(_) => "GENERATION_FAILED",
            ToolError::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }

    /// Log the failure and render it as an MCP error result.
    pub fn into_call_result(self, tool: &str) -> CallToolResult {
        let code = self.code();
        match code {
            "INVALID_ARGUMENT" => tracing::warn!(tool, code, error = %self, "Tool call rejected"),
            _ => tracing::error!(tool, code, error = %self, "Tool call failed"),
        }
        CallToolResult::error(vec![Content::text(format!("Error [{code}]: {self}"))])
    }
}

fn comfyui_code(err: &ComfyUIApiError) -> &'static str {
    match err {
        ComfyUIApiError::Request(e) => request_code(e),
        ComfyUIApiError::ApiError { .. } | ComfyUIApiError::Malformed(_) => "UPSTREAM_ERROR",
    }
}

fn request_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "TIMEOUT"
    } else if err.is_connect() {
        "BACKEND_UNAVAILABLE"
    } else {
        "UPSTREAM_ERROR"
    }
}
