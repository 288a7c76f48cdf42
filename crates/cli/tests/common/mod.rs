//! Common utilities for integration tests

#![allow(dead_code)]

pub mod cli;

use std::path::Path;
use tempfile::TempDir;

/// Temporary project with the given files
pub fn project(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().expect("create temp dir");
    for (path, contents) in files {
        write(temp_dir.path(), path, contents);
    }
    temp_dir
}

pub fn write(root: &Path, path: &str, contents: &str) {
    let full = root.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(full, contents).expect("write file");
}

/// A loopback port nothing is listening on
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local addr").port()
}
