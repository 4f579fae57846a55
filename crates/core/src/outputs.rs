//! Output-directory housekeeping.
//!
//! Lists delivered images, copies finished images out of the backend's
//! own output directory, and stages reference/mask images into the
//! backend's input directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::naming::timestamped_filename;

/// Extensions treated as generated images (lowercase, without dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Extensions treated as model checkpoints.
pub const CHECKPOINT_EXTENSIONS: &[&str] = &["safetensors", "ckpt"];

/// One image found in an output directory.
#[derive(Debug, Clone, Serialize)]
pub struct OutputImage {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Whether `name` has one of the given extensions (case-insensitive).
fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|x| ext.eq_ignore_ascii_case(x)))
}

/// Whether `name` looks like an image this service produces.
pub fn is_image_file(name: &str) -> bool {
    has_extension(name, IMAGE_EXTENSIONS)
}

/// Create `dir` and any missing parents.
pub async fn ensure_dir(dir: &Path) -> Result<(), CoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoreError::io(dir, e))
}

/// Collect `(filename, path, metadata)` for every regular file in `dir`
/// accepted by `keep`. A missing directory yields an empty list.
async fn scan_dir<F>(
    dir: &Path,
    keep: F,
) -> Result<Vec<(String, PathBuf, std::fs::Metadata)>, CoreError>
where
    F: Fn(&str) -> bool,
{
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CoreError::io(dir, e)),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CoreError::io(dir, e))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !keep(&name) {
            continue;
        }
        let metadata = entry
            .metadata()
            .await
            .map_err(|e| CoreError::io(entry.path(), e))?;
        if metadata.is_file() {
            found.push((name, entry.path(), metadata));
        }
    }
    Ok(found)
}

fn modified_time(metadata: &std::fs::Metadata) -> SystemTime {
    metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)
}

/// List images in `dir`, newest first, at most `limit` entries.
pub async fn list_output_images(dir: &Path, limit: usize) -> Result<Vec<OutputImage>, CoreError> {
    let mut found = scan_dir(dir, is_image_file).await?;
    found.sort_by(|a, b| {
        modified_time(&b.2)
            .cmp(&modified_time(&a.2))
            .then_with(|| a.0.cmp(&b.0))
    });

    Ok(found
        .into_iter()
        .take(limit)
        .map(|(filename, path, metadata)| OutputImage {
            filename,
            path,
            size_bytes: metadata.len(),
            modified: DateTime::<Utc>::from(modified_time(&metadata)),
        })
        .collect())
}

/// List checkpoint files in `dir`, sorted by name.
pub async fn list_checkpoints(dir: &Path) -> Result<Vec<String>, CoreError> {
    let mut names: Vec<String> = scan_dir(dir, |n| has_extension(n, CHECKPOINT_EXTENSIONS))
        .await?
        .into_iter()
        .map(|(name, _, _)| name)
        .collect();
    names.sort();
    Ok(names)
}

/// Copy a finished image from the backend's output directory into the
/// service's output directory.
///
/// If `known_filename` is given (as reported by the job history), only
/// that exact file is copied; when it is missing nothing is copied.
/// Without a known name the newest image whose name starts with `prefix`
/// is used, ties broken by name. Returns the destination path, or `None`
/// when nothing matched.
pub async fn relocate_output(
    source_dir: &Path,
    dest_dir: &Path,
    known_filename: Option<&str>,
    prefix: &str,
) -> Result<Option<PathBuf>, CoreError> {
    let source_name = match known_filename {
        Some(name) => {
            let exists = tokio::fs::try_exists(source_dir.join(name))
                .await
                .unwrap_or(false);
            if !exists {
                tracing::warn!(
                    source_dir = %source_dir.display(),
                    filename = name,
                    "Reported image is missing from the backend output directory",
                );
            }
            exists.then(|| name.to_string())
        }
        None => newest_with_prefix(source_dir, prefix).await?,
    };

    let Some(name) = source_name else {
        tracing::warn!(
            source_dir = %source_dir.display(),
            prefix,
            "No generated image found to relocate",
        );
        return Ok(None);
    };

    ensure_dir(dest_dir).await?;
    let source = source_dir.join(&name);
    let dest = dest_dir.join(&name);
    if source == dest {
        return Ok(Some(dest));
    }
    tokio::fs::copy(&source, &dest)
        .await
        .map_err(|e| CoreError::io(&source, e))?;

    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        "Relocated generated image",
    );
    Ok(Some(dest))
}

async fn newest_with_prefix(dir: &Path, prefix: &str) -> Result<Option<String>, CoreError> {
    let found = scan_dir(dir, |n| n.starts_with(prefix) && is_image_file(n)).await?;
    Ok(found
        .into_iter()
        .max_by(|a, b| {
            modified_time(&a.2)
                .cmp(&modified_time(&b.2))
                .then_with(|| a.0.cmp(&b.0))
        })
        .map(|(name, _, _)| name))
}

/// Copy `source` into the backend's input directory under a
/// timestamped, sanitized version of `name`.
///
/// Returns the bare filename the backend should reference.
pub async fn stage_input_image(
    source: &Path,
    input_dir: &Path,
    name: &str,
    at: DateTime<Utc>,
) -> Result<String, CoreError> {
    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        return Err(CoreError::Validation(format!(
            "Image not found: {}",
            source.display()
        )));
    }

    ensure_dir(input_dir).await?;
    let staged_name = timestamped_filename(name, at);
    let target = input_dir.join(&staged_name);
    tokio::fs::copy(source, &target)
        .await
        .map_err(|e| CoreError::io(source, e))?;

    tracing::debug!(
        source = %source.display(),
        staged = %staged_name,
        "Staged input image",
    );
    Ok(staged_name)
}
