//! Configuration management command
//!
//! Provides CLI interface to view and edit `.cssbridge/config.toml`.

use anyhow::{Context, Result};
use bridge_core::settings::example_config;
use bridge_core::Settings;
use cli_lib::util;
use owo_colors::OwoColorize;
use std::path::Path;

/// Boolean settings, in display order
const FLAGS: &[(&str, &str)] = &[
    ("auto_clear", "clear pending changes on reload"),
    ("media_reduce", "match @media conditions"),
    ("file_reduce", "match stylesheet file name"),
    ("use_routes", "match through [[routes]]"),
    ("current_documents_reduce", "only open files"),
    ("resolve_variables", "follow @var / $var references"),
    ("resolve_mixins", "include mixin declarations"),
    ("auto_expand", "print changes as they arrive"),
];

fn flag(settings: &Settings, key: &str) -> Option<bool> {
    Some(match key {
        "auto_clear" => settings.auto_clear,
        "media_reduce" => settings.media_reduce,
        "file_reduce" => settings.file_reduce,
        "use_routes" => settings.use_routes,
        "current_documents_reduce" => settings.current_documents_reduce,
        "resolve_variables" => settings.resolve_variables,
        "resolve_mixins" => settings.resolve_mixins,
        "auto_expand" => settings.auto_expand,
        _ => return None,
    })
}

fn flag_mut<'a>(settings: &'a mut Settings, key: &str) -> Option<&'a mut bool> {
    Some(match key {
        "auto_clear" => &mut settings.auto_clear,
        "media_reduce" => &mut settings.media_reduce,
        "file_reduce" => &mut settings.file_reduce,
        "use_routes" => &mut settings.use_routes,
        "current_documents_reduce" => &mut settings.current_documents_reduce,
        "resolve_variables" => &mut settings.resolve_variables,
        "resolve_mixins" => &mut settings.resolve_mixins,
        "auto_expand" => &mut settings.auto_expand,
        _ => return None,
    })
}

/// List all configuration values
pub fn run_list(root: &Path) -> Result<()> {
    let settings = util::load_settings(root)?;
    let path = Settings::path_for(root);

    println!("{}", "Project Configuration".bold());
    println!("{}: {}", "Location".dimmed(), path.display().dimmed());
    if !path.exists() {
        println!("{}", "(not created yet, showing defaults)".dimmed());
    }
    println!();

    for (key, help) in FLAGS {
        let value = flag(&settings, key).unwrap_or_default();
        println!("{} = {} {}", key.cyan(), value, format!("({})", help).dimmed());
    }

    println!("\n{}", "[server]".yellow());
    println!("  {} = {}", "port".cyan(), settings.server.port);
    println!(
        "  {} = {} {}",
        "read_timeout_secs".cyan(),
        settings.server.read_timeout_secs,
        format!("({}s)", settings.server.read_timeout_secs).dimmed()
    );

    println!("\n{}", "[[routes]]".yellow());
    if settings.routes.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for mapping in settings.routes.mappings() {
        println!(
            "  {} → {}",
            mapping.prefix.cyan(),
            util::display_path(root, &mapping.directory)
        );
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  server.port: 1-65535");
    println!("  server.read_timeout_secs: 1-300");

    Ok(())
}

/// Get a single configuration value
pub fn run_get(root: &Path, key: &str) -> Result<()> {
    let settings = util::load_settings(root)?;

    let value = match key {
        "server.port" => settings.server.port.to_string(),
        "server.read_timeout_secs" => settings.server.read_timeout_secs.to_string(),
        _ => match flag(&settings, key) {
            Some(value) => value.to_string(),
            None => anyhow::bail!(
                "Unknown config key: {}. Use 'cssbridge config list' to see available keys.",
                key
            ),
        },
    };

    println!("{}", value);
    Ok(())
}

/// Set a configuration value
pub fn run_set(root: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = util::load_settings(root)?;

    match key {
        "server.port" => {
            settings.server.port = value
                .parse()
                .context("Invalid value: must be an integer 1-65535")?;
        }
        "server.read_timeout_secs" => {
            settings.server.read_timeout_secs = value
                .parse()
                .context("Invalid value: must be a positive integer")?;
        }
        _ => match flag_mut(&mut settings, key) {
            Some(slot) => {
                *slot = value
                    .parse()
                    .context("Invalid value: must be 'true' or 'false'")?;
            }
            None => anyhow::bail!(
                "Unknown config key: {}. Use 'cssbridge config list' to see available keys.",
                key
            ),
        },
    }

    util::save_settings(root, &settings)?;
    println!("{} Set {} = {}", "✓".green(), key.cyan(), value);
    println!("{}", "A running bridge picks this up after 'reload' in its console".dimmed());

    Ok(())
}

/// Print the configuration file path
pub fn run_path(root: &Path) -> Result<()> {
    println!("{}", Settings::path_for(root).display());
    Ok(())
}

/// Print a documented example configuration
pub fn run_example() -> Result<()> {
    print!("{}", example_config());
    Ok(())
}
