//! `list_outputs`: recent images in the output directory.

use serde_json::json;

use imagegen_core::outputs::{list_output_images, OutputImage};

use crate::error::{ToolError, ToolResult};
use crate::requests::ListOutputsRequest;
use crate::response::ToolOutput;
use crate::service::GenerationService;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 500;

fn size_kb(bytes: u64) -> f64 {
    (bytes as f64 / 1024.0 * 10.0).round() / 10.0
}

fn render(images: &[OutputImage]) -> String {
    if images.is_empty() {
        return "No generated images found".to_string();
    }
    let mut text = format!("Recent images ({}):\n", images.len());
    for image in images {
        text.push_str(&format!(
            "- {} ({} KB, {})\n",
            image.filename,
            size_kb(image.size_bytes),
            image.modified.format("%Y-%m-%d %H:%M:%S"),
        ));
    }
    text.truncate(text.trim_end().len());
    text
}

pub async fn run(service: &GenerationService, req: ListOutputsRequest) -> ToolResult<ToolOutput> {
    let limit = req.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ToolError::invalid(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }

    let output_dir = &service.config().output_dir;
    let images = list_output_images(output_dir, limit).await?;

    let entries: Vec<_> = images
        .iter()
        .map(|image| {
            json!({
                "filename": image.filename,
                "path": image.path,
                "size_kb": size_kb(image.size_bytes),
                "modified": image.modified.to_rfc3339(),
            })
        })
        .collect();
    let data = json!({
        "output_dir": output_dir,
        "count": entries.len(),
        "images": entries,
    });
    Ok(ToolOutput::new(render(&images), &data))
}
