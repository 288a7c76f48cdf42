//! Session workers
//!
//! Each session runs on its own task and owns its engine, pending store and
//! backend. Commands are processed strictly in arrival order, which makes
//! the worker the only writer of its store.

use crate::error::SessionError;
use bridge_core::location::filename_hint;
use bridge_core::{ChangeEvent, FileId, Settings};
use journal::{
    ApplyReport, ChangeId, ChangeSink, EngineAction, FileLocator, PendingTree, ReduceContext,
    ReduceStrategy, ReductionEngine, ResolveOptions, Scope, StyleResolver,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Session identifier (usually the project root)
pub type SessionId = String;

/// Everything a session needs from the editor side
pub trait Backend: FileLocator + StyleResolver + ChangeSink + Send + 'static {}

impl<T> Backend for T where T: FileLocator + StyleResolver + ChangeSink + Send + 'static {}

/// Navigation direction through pending changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Result of a navigation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub target: Option<ChangeId>,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Messages accepted by a session worker
#[derive(Debug)]
pub enum SessionCommand {
    Event(ChangeEvent),
    Apply {
        scope: Scope,
        reply: oneshot::Sender<ApplyReport>,
    },
    Discard {
        scope: Scope,
        reply: oneshot::Sender<usize>,
    },
    Snapshot(oneshot::Sender<PendingTree>),
    Navigate {
        direction: Direction,
        anchor: Option<ChangeId>,
        reply: oneshot::Sender<Navigation>,
    },
    FileOpened(FileId),
    FileClosed(FileId),
    UpdateSettings(Settings),
    Shutdown,
}

/// Cloneable sender side of a session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Queue a browser event without waiting for it to be processed
    pub fn send_event(&self, event: ChangeEvent) -> Result<(), SessionError> {
        self.send(SessionCommand::Event(event))
    }

    /// Apply pending changes in a scope through the backend
    pub async fn apply(&self, scope: Scope) -> Result<ApplyReport, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Apply { scope, reply })?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Drop pending changes in a scope
    pub async fn discard(&self, scope: Scope) -> Result<usize, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Discard { scope, reply })?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Current pending changes as a tree
    pub async fn snapshot(&self) -> Result<PendingTree, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Step to the next or previous pending change
    pub async fn navigate(
        &self,
        direction: Direction,
        anchor: Option<ChangeId>,
    ) -> Result<Navigation, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Navigate {
            direction,
            anchor,
            reply,
        })?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub fn file_opened(&self, file: FileId) -> Result<(), SessionError> {
        self.send(SessionCommand::FileOpened(file))
    }

    pub fn file_closed(&self, file: FileId) -> Result<(), SessionError> {
        self.send(SessionCommand::FileClosed(file))
    }

    pub fn update_settings(&self, settings: Settings) -> Result<(), SessionError> {
        self.send(SessionCommand::UpdateSettings(settings))
    }

    /// Ask the worker to stop after the commands already queued
    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown);
    }

    /// Check if the worker has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(command).map_err(|_| SessionError::Closed)
    }

    /// Handle wired to a bare receiver instead of a worker
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<SessionCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// Start a session worker
///
/// The join handle yields the backend back once the worker stops.
pub fn spawn<B: Backend>(
    id: impl Into<SessionId>,
    settings: Settings,
    backend: B,
) -> (SessionHandle, JoinHandle<B>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = SessionWorker {
        id: id.into(),
        strategy: ReduceStrategy::from_settings(&settings),
        engine: ReductionEngine::new(settings),
        open_files: Vec::new(),
        backend,
    };
    let task = tokio::spawn(worker.run(rx));
    (SessionHandle { tx }, task)
}

struct SessionWorker<B> {
    id: SessionId,
    engine: ReductionEngine,
    strategy: ReduceStrategy,
    open_files: Vec<FileId>,
    backend: B,
}

impl<B: Backend> SessionWorker<B> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) -> B {
        info!("Session {} started", self.id);

        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::Event(event) => self.handle_event(&event),
                SessionCommand::Apply { scope, reply } => {
                    let report = self
                        .engine
                        .store_mut()
                        .apply_scope(&scope, &mut self.backend);
                    info!(
                        "Session {}: applied {}, {} failed",
                        self.id,
                        report.applied.len(),
                        report.failed.len()
                    );
                    let _ = reply.send(report);
                }
                SessionCommand::Discard { scope, reply } => {
                    let removed = self.engine.store_mut().discard_scope(&scope);
                    debug!("Session {}: discarded {}", self.id, removed);
                    let _ = reply.send(removed);
                }
                SessionCommand::Snapshot(reply) => {
                    let _ = reply.send(PendingTree::project(self.engine.store()));
                }
                SessionCommand::Navigate {
                    direction,
                    anchor,
                    reply,
                } => {
                    let store = self.engine.store();
                    let target = match direction {
                        Direction::Next => store.next(anchor),
                        Direction::Previous => store.previous(anchor),
                    };
                    let _ = reply.send(Navigation {
                        target,
                        has_next: store.has_next(target),
                        has_previous: store.has_previous(),
                    });
                }
                SessionCommand::FileOpened(file) => {
                    if !self.open_files.contains(&file) {
                        debug!("Session {}: opened {}", self.id, file);
                        self.open_files.push(file);
                    }
                }
                SessionCommand::FileClosed(file) => {
                    self.open_files.retain(|f| f != &file);
                    self.engine.file_closed(&file);
                }
                SessionCommand::UpdateSettings(settings) => {
                    self.strategy = ReduceStrategy::from_settings(&settings);
                    self.engine.set_settings(settings);
                    debug!("Session {}: settings updated", self.id);
                }
                SessionCommand::Shutdown => break,
            }
        }

        info!("Session {} stopped", self.id);
        self.backend
    }

    fn handle_event(&mut self, event: &ChangeEvent) {
        let Some(change) = event.rule_change() else {
            let action = self.engine.ingest(event, &[], &self.backend);
            self.log_action(event, &action);
            return;
        };

        let settings = self.engine.settings();
        let route = if settings.use_routes {
            settings.routes.resolve(&event.document_url)
        } else {
            None
        };
        let hint = filename_hint(&event.document_url);

        let candidates =
            self.backend
                .candidates_for(route.as_ref(), &self.open_files, hint.as_deref());
        let ctx = ReduceContext {
            route: route.as_ref(),
            open_files: &self.open_files,
            filename_hint: hint.as_deref(),
            change,
            resolver: &self.backend,
            options: ResolveOptions {
                mixins: settings.resolve_mixins,
            },
        };
        let targets = self.strategy.reduce(&ctx, candidates);

        let action = self.engine.ingest(event, &targets, &self.backend);
        self.log_action(event, &action);
    }

    fn log_action(&self, event: &ChangeEvent, action: &EngineAction) {
        match action {
            EngineAction::Cleared(n) => {
                debug!("Session {}: reload of {} cleared {}", self.id, event.document_url, n)
            }
            EngineAction::NoTarget => {
                info!("Session {}: no stylesheet for {}", self.id, event.document_url)
            }
            EngineAction::Updated(ids) => {
                debug!("Session {}: {} pending change(s) touched", self.id, ids.len());
                if self.engine.settings().auto_expand {
                    for id in ids {
                        if let Some(change) = self.engine.store().get(*id) {
                            info!("{} {}", change.file, change);
                        }
                    }
                }
            }
        }
    }
}
