use crate::layout::LayoutDocument;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn load_layout_file(path: impl AsRef<Path>) -> Result<LayoutDocument> {
    let path = path.as_ref();
    LayoutDocument::load_from_path(path).with_context(|| format!("Failed to load layout '{}'", path.display()))
}

/// Writes `document` as pretty JSON, creating missing parent directories.
pub fn save_layout_file(document: &LayoutDocument, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export directory '{}'", parent.display()))?;
    }
    document.save_to_path(path).with_context(|| format!("Failed to export layout '{}'", path.display()))
}
