//! Core types for the cssbridge live style bridge
//!
//! This crate provides:
//! - Browser change events (`ChangeEvent`, `EventKind`)
//! - Wire decoding of inbound HTTP requests into events
//! - URL prefix → local directory route table
//! - Per-project settings (TOML-backed)
//! - Stylesheet file identities

pub mod event;
pub mod file;
pub mod location;
pub mod routes;
pub mod settings;
pub mod wire;

// Re-exports
pub use event::{ChangeEvent, EventKind, RuleChange};
pub use file::FileId;
pub use routes::{RouteError, RouteMapping, RouteResolution, RouteTable};
pub use settings::{ServerSettings, Settings, SettingsError};
pub use wire::{decode, DecodeError, Method};

/// Default loopback port the browser extension talks to
pub const DEFAULT_PORT: u16 = 6776;
