//! Path and directory management.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::media::{AcquisitionItem, ItemKind};

use super::naming::sanitize_path_component;

/// Directory an item's files are written to.
///
/// Podcast episodes land in a subdirectory named after their show.
pub fn item_directory(output_root: &Path, item: &AcquisitionItem) -> PathBuf {
    match &item.parent {
        Some(parent) if parent.kind == ItemKind::PodcastParent => {
            let folder =
                sanitize_path_component(&parent.title).unwrap_or_else(|_| parent.id.clone());
            output_root.join(folder)
        }
        _ => output_root.to_path_buf(),
    }
}

/// Staging file for part `index` of a transfer into `target`.
///
/// Part 0 is `<target>.tmp`, later parts are `<target>.tmp.<index>`.
pub fn staging_path(target: &Path, index: usize) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    if index > 0 {
        name.push(format!(".{}", index));
    }
    PathBuf::from(name)
}

/// Sidecar holding the resume state of a transfer into `target`.
pub fn resume_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".resume");
    PathBuf::from(name)
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| Error::from_io(path, e))?;
    }
    Ok(())
}
