//! URL prefix → local directory routes
//!
//! Maps the path a browser sees (`/static/css/`) to the project directory
//! that serves it. Longest prefix wins; the synthetic root `/` is the
//! fallback web root.

use crate::location::document_path;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// The web root prefix
pub const ROOT_PREFIX: &str = "/";

/// Route configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route prefix is empty")]
    Empty,

    #[error("route prefix must start with '/': {0:?}")]
    NotAbsolute(String),

    #[error("route prefix has surrounding whitespace: {0:?}")]
    Untrimmed(String),

    #[error("duplicate route prefix: {0}")]
    Duplicate(String),

    #[error("more than one web root ('/') mapping")]
    MultipleRoots,
}

/// One `(url prefix, local directory)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMapping {
    /// URL path prefix, always starting with `/`
    pub prefix: String,
    /// Local directory serving that prefix
    pub directory: PathBuf,
}

impl RouteMapping {
    /// Create a validated mapping
    pub fn new(prefix: &str, directory: impl Into<PathBuf>) -> Result<Self, RouteError> {
        validate_prefix(prefix)?;
        Ok(Self {
            prefix: prefix.to_string(),
            directory: directory.into(),
        })
    }

    /// Check if this is the web root mapping
    pub fn is_root(&self) -> bool {
        self.prefix == ROOT_PREFIX
    }

    /// Prefix without its trailing slash; `/css` and `/css/` name one route
    fn key(&self) -> &str {
        prefix_key(&self.prefix)
    }

    /// Prefix with a trailing slash, for directory-boundary matching
    fn dir_prefix(&self) -> String {
        if self.prefix.ends_with('/') {
            self.prefix.clone()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Strip this mapping's prefix from a URL path
    ///
    /// Non-root prefixes only match on a `/` boundary, so `/css` covers
    /// `/css/a.css` but not `/cssx/a.css`.
    fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.is_root() {
            return path.strip_prefix('/');
        }
        let dir_prefix = self.dir_prefix();
        if let Some(rest) = path.strip_prefix(dir_prefix.as_str()) {
            return Some(rest);
        }
        // Exact match on the directory itself
        if path == self.prefix.trim_end_matches('/') {
            return Some("");
        }
        None
    }
}

/// Result of resolving a document URL against the route table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResolution {
    /// Directory of the matched mapping
    pub local_directory: PathBuf,
    /// Remaining URL path, relative to `local_directory`
    pub relative_path: PathBuf,
}

impl RouteResolution {
    /// Full local path the URL maps to
    pub fn local_path(&self) -> PathBuf {
        self.local_directory.join(&self.relative_path)
    }
}

/// Ordered set of route mappings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTable {
    mappings: Vec<RouteMapping>,
}

impl RouteTable {
    /// Create an empty route table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a route table from mappings, validating all of them
    pub fn from_mappings(mappings: Vec<RouteMapping>) -> Result<Self, RouteError> {
        let mut table = Self::new();
        for mapping in mappings {
            table.insert(mapping)?;
        }
        Ok(table)
    }

    /// Add a mapping
    ///
    /// Rejects a duplicate prefix or a second web root.
    pub fn insert(&mut self, mapping: RouteMapping) -> Result<(), RouteError> {
        validate_prefix(&mapping.prefix)?;
        if mapping.is_root() && self.root().is_some() {
            return Err(RouteError::MultipleRoots);
        }
        if self.mappings.iter().any(|m| m.key() == mapping.key()) {
            return Err(RouteError::Duplicate(mapping.prefix));
        }
        self.mappings.push(mapping);
        Ok(())
    }

    /// Remove the mapping for a prefix, returning it if present
    ///
    /// A trailing slash on either side is ignored.
    pub fn remove(&mut self, prefix: &str) -> Option<RouteMapping> {
        let key = prefix_key(prefix);
        let idx = self.mappings.iter().position(|m| m.key() == key)?;
        Some(self.mappings.remove(idx))
    }

    /// Make `directory` the web root, replacing any existing root
    pub fn set_root(&mut self, directory: impl Into<PathBuf>) {
        self.mappings.retain(|m| !m.is_root());
        self.mappings.push(RouteMapping {
            prefix: ROOT_PREFIX.to_string(),
            directory: directory.into(),
        });
    }

    /// The web root mapping, if configured
    pub fn root(&self) -> Option<&RouteMapping> {
        self.mappings.iter().find(|m| m.is_root())
    }

    /// Check all mappings (used after deserializing)
    pub fn validate(&self) -> Result<(), RouteError> {
        let mut seen = Vec::with_capacity(self.mappings.len());
        let mut roots = 0;
        for mapping in &self.mappings {
            validate_prefix(&mapping.prefix)?;
            if mapping.is_root() {
                roots += 1;
            }
            if seen.contains(&mapping.key()) {
                return Err(RouteError::Duplicate(mapping.prefix.clone()));
            }
            seen.push(mapping.key());
        }
        if roots > 1 {
            return Err(RouteError::MultipleRoots);
        }
        Ok(())
    }

    /// Resolve relative directories against `base`
    pub fn rebase(&mut self, base: &Path) {
        for mapping in &mut self.mappings {
            if mapping.directory.is_relative() {
                mapping.directory = base.join(&mapping.directory);
            }
        }
    }

    /// All mappings in insertion order
    pub fn mappings(&self) -> &[RouteMapping] {
        &self.mappings
    }

    /// Number of mappings
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Check if no routes are configured
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Resolve a document URL to a local directory and relative path
    ///
    /// Picks the longest matching prefix; any non-root mapping beats the
    /// web root. Performs no filesystem access. A path that would climb out
    /// of the mapped directory (`..`, including percent-encoded forms)
    /// resolves to nothing.
    pub fn resolve(&self, document_url: &str) -> Option<RouteResolution> {
        let path = document_path(document_url)?;

        let best = self
            .mappings
            .iter()
            .filter_map(|m| m.strip(&path).map(|rest| (m, rest)))
            .max_by_key(|(m, _)| (!m.is_root(), m.prefix.trim_end_matches('/').len()))?;

        let (mapping, rest) = best;
        let relative_path = PathBuf::from(rest.trim_start_matches('/'));
        if !relative_path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(RouteResolution {
            local_directory: mapping.directory.clone(),
            relative_path,
        })
    }
}

fn prefix_key(prefix: &str) -> &str {
    prefix.trim_end_matches('/')
}

fn validate_prefix(prefix: &str) -> Result<(), RouteError> {
    if prefix.trim().is_empty() {
        return Err(RouteError::Empty);
    }
    if prefix != prefix.trim() {
        return Err(RouteError::Untrimmed(prefix.to_string()));
    }
    if !prefix.starts_with('/') {
        return Err(RouteError::NotAbsolute(prefix.to_string()));
    }
    Ok(())
}
