//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use bridge_core::settings::STATE_DIR;
use bridge_core::Settings;
use std::path::{Path, PathBuf};

/// Find the project root
///
/// An explicit `--project` wins. Otherwise walks up from cwd to the first
/// directory holding `.cssbridge/`, falling back to cwd itself.
pub fn find_project_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return dir
            .canonicalize()
            .with_context(|| format!("Project directory not found: {}", dir.display()));
    }

    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let mut current = cwd.as_path();
    loop {
        if current.join(STATE_DIR).is_dir() {
            return Ok(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    Ok(cwd)
}

/// Load project settings
pub fn load_settings(root: &Path) -> Result<Settings> {
    Settings::load(root)
        .with_context(|| format!("Failed to load {}", Settings::path_for(root).display()))
}

/// Validate and write project settings
pub fn save_settings(root: &Path, settings: &Settings) -> Result<()> {
    settings
        .save(root)
        .with_context(|| format!("Failed to save {}", Settings::path_for(root).display()))
}

/// Display a path relative to the project root when it lies inside it
pub fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
