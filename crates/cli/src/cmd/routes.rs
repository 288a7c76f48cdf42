//! Route table management

use anyhow::{Context, Result};
use bridge_core::RouteMapping;
use cli_lib::util;
use owo_colors::OwoColorize;
use std::path::Path;

/// List routes
pub fn run_list(root: &Path) -> Result<()> {
    let settings = util::load_settings(root)?;

    if settings.routes.is_empty() {
        println!("{}", "No routes configured".dimmed());
        println!("  Add one with 'cssbridge routes add <prefix> <dir>'");
        return Ok(());
    }

    println!("{}", "Routes".bold());
    for mapping in settings.routes.mappings() {
        let exists = mapping.directory.is_dir();
        println!(
            "  {} → {}{}",
            mapping.prefix.cyan(),
            util::display_path(root, &mapping.directory),
            if exists { String::new() } else { format!(" {}", "(missing)".yellow()) }
        );
    }
    if !settings.use_routes {
        println!();
        println!("{}", "use_routes is off; routes are not used for matching".dimmed());
    }
    Ok(())
}

/// Map a URL prefix to a directory
pub fn run_add(root: &Path, prefix: &str, directory: &Path) -> Result<()> {
    let mut settings = util::load_settings(root)?;
    let mapping = RouteMapping::new(prefix, root.join(directory))?;
    settings
        .routes
        .insert(mapping)
        .with_context(|| format!("Cannot add route {}", prefix))?;
    util::save_settings(root, &settings)?;

    println!("{} Added route {} → {}", "✓".green(), prefix.cyan(), directory.display());
    Ok(())
}

/// Remove a route by prefix
pub fn run_remove(root: &Path, prefix: &str) -> Result<()> {
    let mut settings = util::load_settings(root)?;
    if settings.routes.remove(prefix).is_none() {
        anyhow::bail!("No route with prefix {}", prefix);
    }
    util::save_settings(root, &settings)?;

    println!("{} Removed route {}", "✓".green(), prefix.cyan());
    Ok(())
}

/// Set the web root directory
pub fn run_root(root: &Path, directory: &Path) -> Result<()> {
    let mut settings = util::load_settings(root)?;
    settings.routes.set_root(root.join(directory));
    util::save_settings(root, &settings)?;

    println!("{} Web root → {}", "✓".green(), directory.display());
    Ok(())
}
