use anyhow::Context;
use rmcp::ServiceExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use imagegen_core::config::{load_dotenv, AppConfig};
use imagegen_core::outputs::ensure_dir;
use imagegen_mcp::server::ImageGenServer;
use imagegen_mcp::service::GenerationService;

const DEFAULT_FILTER: &str =
    "imagegen_mcp=info,imagegen_comfyui=info,imagegen_webui=info,imagegen_launcher=info,imagegen_core=info";

/// stdout carries protocol frames, so every log line goes to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = load_dotenv();
    init_tracing();
    if let Some(path) = env_file {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    let config = AppConfig::from_env().context("Invalid configuration")?;
    ensure_dir(&config.output_dir)
        .await
        .context("Failed to create output directory")?;
    tracing::info!(
        comfyui = %config.comfyui_api_url,
        webui = %config.webui_api_url,
        output_dir = %config.output_dir.display(),
        "Starting image generation MCP server",
    );

    let service = GenerationService::new(config).context("Failed to build backend clients")?;
    let server = ImageGenServer::new(service)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
    server.waiting().await?;

    tracing::info!("MCP server stopped");
    Ok(())
}
