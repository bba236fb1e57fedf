use crate::client::is_supported_image;
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Expand files and directories into a sorted, de-duplicated image list.
pub fn collect_images(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            scan_dir(path, recursive, &mut found)?;
        } else if path.is_file() {
            if is_supported_image(path) {
                found.insert(path.clone());
            } else {
                warn!("skipping unsupported file: {}", path.display());
            }
        } else {
            bail!("path does not exist: {}", path.display());
        }
    }
    debug!("collected {} images", found.len());
    Ok(found.into_iter().collect())
}

fn scan_dir(dir: &Path, recursive: bool, found: &mut BTreeSet<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading directory: {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                scan_dir(&path, recursive, found)?;
            }
        } else if is_supported_image(&path) {
            found.insert(path);
        } else {
            debug!("ignoring {}", path.display());
        }
    }
    Ok(())
}
