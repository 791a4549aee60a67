use crate::storage::StorageResult;
use crate::url::{derive_relative_path, safe_component};
use std::path::{Path, PathBuf};

/// Writes fetched content to its derived location
///
/// The file lands at `<root>/<site>/<derived path>`, with `site` reduced to a
/// single safe directory name. Parent directories are created as needed and
/// an existing file is overwritten.
///
/// # Returns
///
/// The path written to
pub async fn save_content(
    root: &Path,
    site: &str,
    url: &str,
    content: &str,
    suffix: &str,
) -> StorageResult<PathBuf> {
    let relative = derive_relative_path(url, suffix)?;
    let target = root.join(safe_component(site)).join(relative);

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, content.as_bytes()).await?;

    tracing::trace!("Wrote {} bytes to {}", content.len(), target.display());
    Ok(target)
}
