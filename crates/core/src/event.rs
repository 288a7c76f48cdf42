//! Browser change events

use serde::{Deserialize, Serialize};

/// One mutation reported by the browser extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Absolute URL of the page or stylesheet being edited
    pub document_url: String,
    /// What happened
    pub kind: EventKind,
}

/// Type of browser event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A single declaration changed in devtools
    RuleChange(RuleChange),
    /// The page was reloaded or navigated away from
    PageReload,
}

/// A changed declaration inside a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChange {
    /// Rule selector, whitespace-normalized
    pub selector: String,
    /// Property name, lower-cased
    pub property: String,
    /// New value; empty means the declaration was removed
    pub value: String,
    /// `!important` flag
    pub important: bool,
    /// Enclosing `@media` condition, whitespace-normalized
    pub media: Option<String>,
}

impl ChangeEvent {
    /// Create a page reload event
    pub fn reload(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
            kind: EventKind::PageReload,
        }
    }

    /// Create a rule change event
    pub fn rule(document_url: impl Into<String>, change: RuleChange) -> Self {
        Self {
            document_url: document_url.into(),
            kind: EventKind::RuleChange(change),
        }
    }

    /// The rule change carried by this event, if any
    pub fn rule_change(&self) -> Option<&RuleChange> {
        match &self.kind {
            EventKind::RuleChange(change) => Some(change),
            EventKind::PageReload => None,
        }
    }

    /// Check if this is a reload/navigation event
    pub fn is_reload(&self) -> bool {
        matches!(self.kind, EventKind::PageReload)
    }
}

impl RuleChange {
    /// Create a new rule change, normalizing selector and property
    pub fn new(selector: &str, property: &str, value: &str) -> Self {
        Self {
            selector: normalize_whitespace(selector),
            property: property.trim().to_ascii_lowercase(),
            value: value.trim().to_string(),
            important: false,
            media: None,
        }
    }

    /// Set the `!important` flag
    pub fn with_important(mut self, important: bool) -> Self {
        self.important = important;
        self
    }

    /// Set the enclosing media condition (empty strings are treated as absent)
    pub fn with_media(mut self, media: Option<&str>) -> Self {
        self.media = media
            .map(normalize_whitespace)
            .filter(|m| !m.is_empty());
        self
    }

    /// Check if the browser removed the declaration
    pub fn is_removal(&self) -> bool {
        self.value.is_empty()
    }
}

/// Trim and collapse whitespace runs to a single space
///
/// Selectors and media conditions compare equal regardless of how the
/// browser or the source file formatted them.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a trailing `!important` off a value
///
/// Returns the bare value and whether the flag was present.
pub fn split_important(value: &str) -> (&str, bool) {
    let trimmed = value.trim_end();
    if let Some(bang) = trimmed.rfind('!') {
        let (head, flag) = trimmed.split_at(bang);
        if flag[1..].trim().eq_ignore_ascii_case("important") {
            return (head.trim_end(), true);
        }
    }
    (trimmed, false)
}
