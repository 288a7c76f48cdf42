//! Ingestion server and session workers
//!
//! This crate provides:
//! - Loopback HTTP listener decoding browser notifications
//! - Session registry dispatching events to every live session
//! - Per-session worker tasks owning the reduction engine

pub mod error;
pub mod registry;
pub mod server;
pub mod session;

// Re-exports
pub use error::{BindError, SessionError};
pub use registry::SessionRegistry;
pub use server::{loopback, router, IngestionServer, DEFAULT_READ_TIMEOUT, MAX_BODY_BYTES};
pub use session::{spawn, Backend, Direction, Navigation, SessionCommand, SessionHandle, SessionId};
