//! Show how a document URL maps onto the project

use anyhow::Result;
use bridge_core::location::filename_hint;
use cli_lib::{util, FsProject};
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(root: &Path, url: &str) -> Result<()> {
    let settings = util::load_settings(root)?;

    println!("{}: {}", "URL".dimmed(), url);
    match filename_hint(url) {
        Some(name) => println!("{}: {}", "File name".dimmed(), name),
        None => println!("{}: {}", "File name".dimmed(), "(none)".dimmed()),
    }

    match settings.routes.resolve(url) {
        Some(resolution) => {
            let local = resolution.local_path();
            let marker = if local.is_file() {
                "exists".green().to_string()
            } else {
                "missing".yellow().to_string()
            };
            println!(
                "{}: {} ({})",
                "Route".dimmed(),
                util::display_path(root, &local).cyan(),
                marker
            );
            if !settings.use_routes {
                println!(
                    "  {}",
                    "use_routes is off; enable it with 'cssbridge config set use_routes true'"
                        .dimmed()
                );
            }
        }
        None => println!("{}: {}", "Route".dimmed(), "no route matches".yellow()),
    }

    if let Some(name) = filename_hint(url) {
        let project = FsProject::new(root);
        let matching: Vec<_> = project
            .stylesheets()
            .into_iter()
            .filter(|p| p.file_name().and_then(|n| n.to_str()) == Some(name.as_str()))
            .collect();
        if !matching.is_empty() {
            println!("{}:", "Same-name stylesheets".dimmed());
            for path in matching {
                println!("  {}", util::display_path(root, &path));
            }
        }
    }

    Ok(())
}
