//! Library side of the `cssbridge` CLI
//!
//! Exposes the filesystem backend so it can be tested and reused without
//! going through the binary.

pub mod css;
pub mod project;
pub mod util;

pub use project::FsProject;
