//! Stylesheet file identities

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identity of a stylesheet file
///
/// Owned by whatever locates files (editor, filesystem backend); the
/// reduction engine only holds and compares these. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(Arc<PathBuf>);

impl FileId {
    /// Create a file identity from a path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Arc::new(path.into()))
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Final path component, if it is valid UTF-8
    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name().and_then(|n| n.to_str())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&Path> for FileId {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for FileId {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}
