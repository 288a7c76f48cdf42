//! Run the bridge in the foreground
//!
//! Binds the loopback listener, starts one session for the project, and
//! reads console commands from stdin until `quit` or Ctrl-C.

use anyhow::{Context, Result};
use bridge_core::FileId;
use cli_lib::{util, FsProject};
use journal::{ApplyReport, ChangeId, PendingTree, Scope};
use owo_colors::OwoColorize;
use server::{loopback, spawn, BindError, Direction, IngestionServer, SessionHandle, SessionRegistry};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// A line typed into the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    /// Apply one change by number, or all
    Apply(Option<u64>),
    /// Discard one change by number, or all
    Discard(Option<u64>),
    Next,
    Previous,
    Open(PathBuf),
    Close(PathBuf),
    /// Re-read settings from disk
    Reload,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse a console line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        if words.next().is_some() {
            return Err(format!("too many arguments for '{}'", verb));
        }

        let number = |arg: Option<&str>| -> Result<Option<u64>, String> {
            arg.map(|a| {
                a.trim_start_matches('#')
                    .parse()
                    .map_err(|_| format!("not a change number: {}", a))
            })
            .transpose()
        };
        let path = |arg: Option<&str>| -> Result<PathBuf, String> {
            arg.map(PathBuf::from)
                .ok_or_else(|| format!("'{}' needs a file path", verb))
        };
        let bare = |command: Self| -> Result<Option<Self>, String> {
            match arg {
                Some(_) => Err(format!("'{}' takes no arguments", verb)),
                None => Ok(Some(command)),
            }
        };

        match verb {
            "list" | "ls" => bare(Self::List),
            "apply" => Ok(Some(Self::Apply(number(arg)?))),
            "discard" => Ok(Some(Self::Discard(number(arg)?))),
            "next" | "n" => bare(Self::Next),
            "prev" | "p" => bare(Self::Previous),
            "open" => Ok(Some(Self::Open(path(arg)?))),
            "close" => Ok(Some(Self::Close(path(arg)?))),
            "reload" => bare(Self::Reload),
            "help" | "?" => bare(Self::Help),
            "quit" | "exit" | "q" => bare(Self::Quit),
            other => Err(format!("unknown command '{}', try 'help'", other)),
        }
    }
}

pub async fn run(root: &Path, port: Option<u16>, apply_on_exit: bool) -> Result<()> {
    let settings = util::load_settings(root)?;
    let port = port.unwrap_or(settings.server.port);

    let registry = SessionRegistry::new();
    let server = match IngestionServer::bind(loopback(port), registry.clone()).await {
        Ok(server) => server.with_read_timeout(Duration::from_secs(settings.server.read_timeout_secs)),
        Err(BindError::AddressInUse(addr)) => {
            println!("{} Port {} is already in use", "✗".red(), addr.port());
            println!("  Another bridge may be running; check with 'cssbridge status'");
            anyhow::bail!("Cannot listen on {}", addr);
        }
        Err(e) => return Err(e).context("Failed to start listener"),
    };

    let expand = settings.auto_expand;
    let session_id = root.display().to_string();
    let (session, worker) = spawn(session_id.clone(), settings, FsProject::new(root));
    registry.register(session_id.clone(), session.clone());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let listener = tokio::spawn(server.serve(async move {
        let _ = stop_rx.await;
    }));

    println!("{} Listening on 127.0.0.1:{}", "✓".green(), port);
    println!("{}: {}", "Project".dimmed(), root.display().cyan());
    println!("{}", "Type 'help' for commands".dimmed());

    let mut console = Console {
        root,
        session: &session,
        selected: None,
        expand,
    };
    console.run().await?;

    if apply_on_exit {
        let report = session.apply(Scope::All).await?;
        print_report(&report);
    }

    registry.unregister(&session_id);
    let _ = stop_tx.send(());
    listener.await.context("Listener task failed")?;
    session.shutdown();
    worker.await.context("Session task failed")?;

    info!("Bridge stopped");
    Ok(())
}

struct Console<'a> {
    root: &'a Path,
    session: &'a SessionHandle,
    selected: Option<ChangeId>,
    /// Print declarations under each rule in `list`
    expand: bool,
}

impl Console<'_> {
    async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    return Ok(());
                }
                line = lines.next_line(), if stdin_open => {
                    let Some(line) = line.context("Failed to read console")? else {
                        // No console attached; keep serving until Ctrl-C
                        debug!("stdin closed");
                        stdin_open = false;
                        continue;
                    };
                    match ConsoleCommand::parse(&line) {
                        Ok(Some(ConsoleCommand::Quit)) => return Ok(()),
                        Ok(Some(command)) => self.execute(command).await?,
                        Ok(None) => {}
                        Err(message) => println!("{} {}", "✗".red(), message),
                    }
                }
            }
        }
    }

    async fn execute(&mut self, command: ConsoleCommand) -> Result<()> {
        match command {
            ConsoleCommand::List => {
                let tree = self.session.snapshot().await?;
                if tree.is_empty() {
                    println!("{}", "No pending changes".dimmed());
                } else {
                    print!("{}", self.relative(&tree.render(self.expand)));
                }
            }
            ConsoleCommand::Apply(number) => {
                let Some(scope) = self.scope(number).await? else {
                    return Ok(());
                };
                let report = self.session.apply(scope).await?;
                print_report(&report);
            }
            ConsoleCommand::Discard(number) => {
                let Some(scope) = self.scope(number).await? else {
                    return Ok(());
                };
                let removed = self.session.discard(scope).await?;
                println!("{} Discarded {}", "✓".green(), removed);
            }
            ConsoleCommand::Next | ConsoleCommand::Previous => {
                let direction = if command == ConsoleCommand::Next {
                    Direction::Next
                } else {
                    Direction::Previous
                };
                let nav = self.session.navigate(direction, self.selected).await?;
                self.selected = nav.target;
                match nav.target {
                    Some(id) => {
                        let tree = self.session.snapshot().await?;
                        let label = describe(&tree, id).unwrap_or_default();
                        println!("{} {}", id.to_string().cyan(), self.relative(&label));
                    }
                    None => println!("{}", "No pending changes".dimmed()),
                }
            }
            ConsoleCommand::Open(path) => {
                self.session.file_opened(self.file_id(&path))?;
                println!("{} Opened {}", "✓".green(), path.display());
            }
            ConsoleCommand::Close(path) => {
                self.session.file_closed(self.file_id(&path))?;
                println!("{} Closed {}", "✓".green(), path.display());
            }
            ConsoleCommand::Reload => {
                let settings = util::load_settings(self.root)?;
                self.expand = settings.auto_expand;
                self.session.update_settings(settings)?;
                println!("{} Settings reloaded", "✓".green());
            }
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }

    /// Scope for an optional change number; `None` if the number is unknown
    async fn scope(&self, number: Option<u64>) -> Result<Option<Scope>> {
        let Some(number) = number else {
            return Ok(Some(Scope::All));
        };
        let tree = self.session.snapshot().await?;
        match find_change(&tree, number) {
            Some(id) => Ok(Some(Scope::Change(id))),
            None => {
                println!("{} No pending change #{}", "✗".red(), number);
                Ok(None)
            }
        }
    }

    fn file_id(&self, path: &Path) -> FileId {
        FileId::new(self.root.join(path))
    }

    fn relative(&self, text: &str) -> String {
        let prefix = format!("{}/", self.root.display());
        text.replace(&prefix, "")
    }
}

/// Id of the pending change shown as `#number`
fn find_change(tree: &PendingTree, number: u64) -> Option<ChangeId> {
    change_ids(tree).find(|id| id.get() == number)
}

/// `file selector: label` line for a change
fn describe(tree: &PendingTree, id: ChangeId) -> Option<String> {
    tree.files.iter().find_map(|file| {
        file.rules.iter().find_map(|rule| {
            rule.declarations
                .iter()
                .find(|d| d.id == id)
                .map(|d| format!("{} {} {}", file.file, rule.selector, d.label))
        })
    })
}

fn change_ids(tree: &PendingTree) -> impl Iterator<Item = ChangeId> + '_ {
    tree.files
        .iter()
        .flat_map(|f| f.rules.iter())
        .flat_map(|r| r.declarations.iter())
        .map(|d| d.id)
}

fn print_report(report: &ApplyReport) {
    if report.applied.is_empty() && report.failed.is_empty() {
        println!("{}", "Nothing to apply".dimmed());
        return;
    }
    if !report.applied.is_empty() {
        println!("{} Applied {}", "✓".green(), report.applied.len());
    }
    for (id, error) in &report.failed {
        println!("{} {} {}", "✗".red(), id, error);
    }
}

fn print_help() {
    println!("{}", "Commands".bold());
    println!("  {}            show pending changes", "list".cyan());
    println!("  {}     write one change (or all) to source", "apply [N]".cyan());
    println!("  {}   drop one change (or all)", "discard [N]".cyan());
    println!("  {}       step through pending changes", "next/prev".cyan());
    println!("  {}  mark a stylesheet as open", "open <path>".cyan());
    println!("  {} mark a stylesheet as closed", "close <path>".cyan());
    println!("  {}          re-read .cssbridge/config.toml", "reload".cyan());
    println!("  {}            stop the bridge", "quit".cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("   "), Ok(None));
        assert_eq!(ConsoleCommand::parse("ls"), Ok(Some(ConsoleCommand::List)));
        assert_eq!(ConsoleCommand::parse("apply"), Ok(Some(ConsoleCommand::Apply(None))));
        assert_eq!(ConsoleCommand::parse("apply #3"), Ok(Some(ConsoleCommand::Apply(Some(3)))));
        assert_eq!(ConsoleCommand::parse("discard 12"), Ok(Some(ConsoleCommand::Discard(Some(12)))));
        assert_eq!(
            ConsoleCommand::parse("open css/a.css"),
            Ok(Some(ConsoleCommand::Open(PathBuf::from("css/a.css"))))
        );
        assert_eq!(ConsoleCommand::parse(" q "), Ok(Some(ConsoleCommand::Quit)));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(ConsoleCommand::parse("apply x").is_err());
        assert!(ConsoleCommand::parse("open").is_err());
        assert!(ConsoleCommand::parse("list all").is_err());
        assert!(ConsoleCommand::parse("apply 1 2").is_err());
        assert!(ConsoleCommand::parse("frobnicate").is_err());
    }

    #[tokio::test]
    async fn test_console_apply_by_number() {
        use bridge_core::{ChangeEvent, RuleChange, Settings};

        let temp_dir = tempfile::TempDir::new().unwrap();
        let sheet = temp_dir.path().join("a.css");
        std::fs::write(&sheet, ".a { color: red; }").unwrap();

        let (session, _worker) = spawn("test", Settings::default(), FsProject::new(temp_dir.path()));
        session
            .send_event(ChangeEvent::rule(
                "http://localhost/a.css",
                RuleChange::new(".a", "color", "blue"),
            ))
            .unwrap();
        let tree = session.snapshot().await.unwrap();
        let id = change_ids(&tree).next().unwrap();

        let mut console = Console {
            root: temp_dir.path(),
            session: &session,
            selected: None,
            expand: true,
        };
        console.execute(ConsoleCommand::Next).await.unwrap();
        assert_eq!(console.selected, Some(id));

        console.execute(ConsoleCommand::Apply(Some(id.get()))).await.unwrap();
        assert_eq!(std::fs::read_to_string(&sheet).unwrap(), ".a { color: blue; }");
        assert!(session.snapshot().await.unwrap().is_empty());
    }
}
