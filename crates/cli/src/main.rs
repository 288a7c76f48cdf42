//! cssbridge - live CSS edits from the browser into source files

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cmd;

use cli_lib::util;

/// cssbridge - Sync DevTools style edits back into your stylesheets
#[derive(Parser)]
#[command(name = "cssbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory (default: nearest parent with .cssbridge/, else cwd)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .cssbridge/config.toml in the project
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Listen for browser edits and queue them as pending changes
    Start {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,

        /// Apply every pending change when exiting
        #[arg(long)]
        apply_on_exit: bool,
    },
    /// Check whether a bridge is listening
    Status {
        /// Port to query (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Show where a document URL maps to through the route table
    Resolve {
        /// Document URL, e.g. http://localhost:8080/css/main.css
        url: String,
    },
    /// View and edit project settings
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Manage URL prefix → directory routes
    #[command(subcommand)]
    Routes(RouteCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// List all settings
    List,
    /// Print one setting
    Get {
        /// Setting key, e.g. media_reduce or server.port
        key: String,
    },
    /// Change one setting
    Set {
        /// Setting key
        key: String,
        /// New value
        value: String,
    },
    /// Print the settings file location
    Path,
    /// Print a documented example configuration
    Example,
}

#[derive(Subcommand)]
enum RouteCommands {
    /// List routes
    List,
    /// Map a URL prefix to a directory
    Add {
        /// URL path prefix, e.g. /static/css/
        prefix: String,
        /// Directory serving that prefix (relative to the project)
        directory: PathBuf,
    },
    /// Remove a route by prefix
    Remove {
        /// URL path prefix
        prefix: String,
    },
    /// Set the web root ('/') directory
    Root {
        /// Directory served at '/'
        directory: PathBuf,
    },
}

fn init_tracing(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;

    let root = util::find_project_root(cli.project.as_deref())?;

    match cli.command {
        Commands::Init { force } => cmd::init::run(&root, force),
        Commands::Start { port, apply_on_exit } => cmd::start::run(&root, port, apply_on_exit).await,
        Commands::Status { port } => cmd::status::run(&root, port).await,
        Commands::Resolve { url } => cmd::resolve::run(&root, &url),
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list(&root),
            ConfigCommands::Get { key } => cmd::config::run_get(&root, &key),
            ConfigCommands::Set { key, value } => cmd::config::run_set(&root, &key, &value),
            ConfigCommands::Path => cmd::config::run_path(&root),
            ConfigCommands::Example => cmd::config::run_example(),
        },
        Commands::Routes(route_cmd) => match route_cmd {
            RouteCommands::List => cmd::routes::run_list(&root),
            RouteCommands::Add { prefix, directory } => {
                cmd::routes::run_add(&root, &prefix, &directory)
            }
            RouteCommands::Remove { prefix } => cmd::routes::run_remove(&root, &prefix),
            RouteCommands::Root { directory } => cmd::routes::run_root(&root, &directory),
        },
    }
}
