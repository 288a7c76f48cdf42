//! Pending change data structures

use crate::collab::DeclarationHandle;
use bridge_core::FileId;
use std::fmt;

/// Stable handle of a pending change, assigned once at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeId(pub(crate) u64);

impl ChangeId {
    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What applying a change does to source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Add a new declaration (and the rule, if missing)
    Insert,
    /// Replace the value of an existing declaration
    Update(DeclarationHandle),
    /// Delete an existing declaration
    Remove(DeclarationHandle),
}

impl Operation {
    /// Target declaration, if one exists in source
    pub fn handle(&self) -> Option<&DeclarationHandle> {
        match self {
            Operation::Insert => None,
            Operation::Update(handle) | Operation::Remove(handle) => Some(handle),
        }
    }

    /// Short label for display
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update(_) => "update",
            Operation::Remove(_) => "remove",
        }
    }
}

/// A rule inside a file: selector plus `@media` context
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    pub selector: String,
    pub media: Option<String>,
}

/// Deduplication key of a pending change
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeKey {
    pub file: FileId,
    pub rule: RuleKey,
    pub property: String,
}

impl ChangeKey {
    /// Build a key from its parts
    pub fn new(file: FileId, selector: &str, media: Option<&str>, property: &str) -> Self {
        Self {
            file,
            rule: RuleKey {
                selector: selector.to_string(),
                media: media.map(str::to_string),
            },
            property: property.to_string(),
        }
    }

    /// Key addressing an existing declaration
    pub fn for_handle(handle: &DeclarationHandle) -> Self {
        Self::new(
            handle.file.clone(),
            &handle.selector,
            handle.media.as_deref(),
            &handle.property,
        )
    }
}

/// Everything needed to create or refresh a pending change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDraft {
    pub key: ChangeKey,
    pub value: String,
    pub important: bool,
    pub operation: Operation,
    /// Value currently in source, if known
    pub original_value: Option<String>,
    /// Variable the change was redirected onto
    pub via_variable: Option<String>,
    /// URL of the document that reported the change
    pub document_url: String,
}

/// A queued, not yet applied edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub id: ChangeId,
    pub file: FileId,
    pub selector: String,
    pub media: Option<String>,
    pub property: String,
    pub value: String,
    pub important: bool,
    pub operation: Operation,
    pub original_value: Option<String>,
    pub via_variable: Option<String>,
    pub document_url: String,
    /// Insertion/update order; refreshed on every update
    pub sequence: u64,
}

impl PendingChange {
    pub(crate) fn from_draft(id: ChangeId, sequence: u64, draft: ChangeDraft) -> Self {
        let ChangeKey { file, rule, property } = draft.key;
        Self {
            id,
            file,
            selector: rule.selector,
            media: rule.media,
            property,
            value: draft.value,
            important: draft.important,
            operation: draft.operation,
            original_value: draft.original_value,
            via_variable: draft.via_variable,
            document_url: draft.document_url,
            sequence,
        }
    }

    /// Merge a newer draft with the same key into this entry
    ///
    /// The source value seen at creation is kept.
    pub(crate) fn refresh(&mut self, sequence: u64, draft: ChangeDraft) {
        self.value = draft.value;
        self.important = draft.important;
        self.operation = draft.operation;
        self.via_variable = draft.via_variable;
        self.document_url = draft.document_url;
        if self.original_value.is_none() {
            self.original_value = draft.original_value;
        }
        self.sequence = sequence;
    }

    /// Deduplication key
    pub fn key(&self) -> ChangeKey {
        ChangeKey::new(
            self.file.clone(),
            &self.selector,
            self.media.as_deref(),
            &self.property,
        )
    }

    /// Rule this change belongs to
    pub fn rule_key(&self) -> RuleKey {
        RuleKey {
            selector: self.selector.clone(),
            media: self.media.clone(),
        }
    }

    /// Check if applying removes a declaration
    pub fn is_removal(&self) -> bool {
        matches!(self.operation, Operation::Remove(_))
    }

    /// Declaration text as it will be written (`color: red !important`)
    pub fn declaration_text(&self) -> String {
        if self.important {
            format!("{} !important", self.declaration_text_bare())
        } else {
            self.declaration_text_bare()
        }
    }

    fn declaration_text_bare(&self) -> String {
        format!("{}: {}", self.property, self.value)
    }

    /// Human-readable edit, e.g. `color: black -> red`
    pub fn summary(&self) -> String {
        let bang = if self.important { " !important" } else { "" };
        match (&self.operation, self.original_value.as_deref()) {
            (Operation::Remove(_), Some(old)) => format!("{}: {} (removed)", self.property, old),
            (Operation::Remove(_), None) => format!("{} (removed)", self.property),
            (Operation::Insert, _) => format!("{}{} (new)", self.declaration_text_bare(), bang),
            (Operation::Update(_), Some(old)) => {
                format!("{}: {} -> {}{}", self.property, old, self.value, bang)
            }
            (Operation::Update(_), None) => format!("{}{}", self.declaration_text_bare(), bang),
        }
    }
}

impl fmt::Display for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.summary())
    }
}
