//! Pending change journal and reduction
//!
//! This crate provides:
//! - Collaborator traits (file locator, style resolver, change sink)
//! - Candidate reduction strategy (route, file name, open files, media)
//! - Reduction engine turning browser events into pending changes
//! - Pending change store with apply/discard and navigation
//! - Read-only tree projection for display

pub mod change;
pub mod collab;
pub mod engine;
pub mod store;
pub mod strategy;
pub mod tree;

// Re-exports
pub use change::{ChangeDraft, ChangeId, ChangeKey, Operation, PendingChange, RuleKey};
pub use collab::{
    ChangeSink, DeclarationHandle, FileLocator, FoundDeclaration, ResolutionError,
    ResolveOptions, StyleResolver, WriteError,
};
pub use engine::{EngineAction, ReductionEngine};
pub use store::{ApplyReport, PendingStore, Scope, StoreError};
pub use strategy::{Filter, ReduceContext, ReduceStrategy};
pub use tree::PendingTree;
