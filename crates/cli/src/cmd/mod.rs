//! CLI command implementations

pub mod config;
pub mod init;
pub mod resolve;
pub mod routes;
pub mod start;
pub mod status;
