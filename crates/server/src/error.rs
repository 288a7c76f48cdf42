//! Server and session errors

use std::net::SocketAddr;
use thiserror::Error;

/// Failure to open the ingestion listener
#[derive(Debug, Error)]
pub enum BindError {
    #[error("port already in use: {0}")]
    AddressInUse(SocketAddr),

    #[error("failed to bind listener: {0}")]
    Other(#[from] std::io::Error),
}

/// Failure talking to a session worker
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session has shut down")]
    Closed,
}
