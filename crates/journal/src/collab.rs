//! Collaborator interfaces
//!
//! The engine never touches files itself. Locating candidate stylesheets,
//! reading their declarations, and patching source text are delegated to
//! implementations of these traits (an editor integration, or the CLI's
//! filesystem backend).

use crate::change::PendingChange;
use bridge_core::{FileId, RouteResolution};
use std::path::PathBuf;
use thiserror::Error;

/// Address of an existing declaration inside a stylesheet
///
/// `index` is the ordinal of the declaration among those matching
/// `(selector, media, property)` in the file, so a sink can find it again
/// after earlier edits shifted the text around.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclarationHandle {
    pub file: FileId,
    pub selector: String,
    pub media: Option<String>,
    pub property: String,
    pub index: usize,
}

/// A declaration reported by a [`StyleResolver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDeclaration {
    pub handle: DeclarationHandle,
    /// Current value in source, without `!important`
    pub value: String,
    pub important: bool,
}

impl FoundDeclaration {
    /// Enclosing `@media` condition
    pub fn media(&self) -> Option<&str> {
        self.handle.media.as_deref()
    }
}

/// Options passed to declaration lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Include declarations pulled in through mixins
    pub mixins: bool,
}

/// Failure reading a stylesheet's structure
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("cannot parse {file}: {message}")]
    Parse { file: PathBuf, message: String },

    #[error("cannot read {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure writing a change back to source
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot write {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source changed underneath: {0}")]
    Conflict(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Finds stylesheets that may correspond to a browser document
pub trait FileLocator {
    /// Candidate files for a document
    ///
    /// `route` is the route table's resolution (if routes are enabled),
    /// `open_files` the files currently open in the editor, and
    /// `filename_hint` the last path segment of the document URL.
    fn candidates_for(
        &self,
        route: Option<&RouteResolution>,
        open_files: &[FileId],
        filename_hint: Option<&str>,
    ) -> Vec<FileId>;
}

/// Reads declarations out of stylesheet sources
pub trait StyleResolver {
    /// Every declaration of `property` in rules matching `selector`
    ///
    /// Results are in source order and carry their `@media` context.
    fn find_declarations(
        &self,
        file: &FileId,
        selector: &str,
        property: &str,
        options: ResolveOptions,
    ) -> Result<Vec<FoundDeclaration>, ResolutionError>;

    /// Find the assignment of a preprocessor variable visible from `scope`
    fn resolve_variable(
        &self,
        name: &str,
        scope: &DeclarationHandle,
    ) -> Result<Option<FoundDeclaration>, ResolutionError> {
        let _ = (name, scope);
        Ok(None)
    }
}

/// Applies pending changes to source text
pub trait ChangeSink {
    /// Write a declaration, updating it in place or inserting it
    ///
    /// Inserting into a file that has no rule for the selector creates the
    /// rule.
    fn write_declaration(&mut self, change: &PendingChange) -> Result<(), WriteError>;

    /// Remove an existing declaration
    fn remove_declaration(&mut self, handle: &DeclarationHandle) -> Result<(), WriteError>;
}
