//! Initialize cssbridge in a project

use anyhow::{Context, Result};
use bridge_core::settings::example_config;
use bridge_core::Settings;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(root: &Path, force: bool) -> Result<()> {
    let path = Settings::path_for(root);

    if path.exists() && !force {
        println!("{} Already initialized", "✗".red());
        println!("{}: {}", "Location".dimmed(), path.display());
        anyhow::bail!("Configuration exists; pass --force to overwrite it");
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, example_config())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("{} Initialized cssbridge in {}", "✓".green(), root.display().cyan());
    println!();
    println!("Next steps:");
    println!("  - Run 'cssbridge routes root <dir>' to map the web root");
    println!("  - Run 'cssbridge start' and edit styles in the browser");
    Ok(())
}
