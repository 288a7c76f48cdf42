//! Read-only tree view of pending changes
//!
//! Rebuilt from the store on demand; holds copies, never references back.

use crate::change::ChangeId;
use crate::store::PendingStore;
use bridge_core::FileId;
use std::fmt::Write as _;

/// Snapshot of the store grouped for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTree {
    pub files: Vec<FileNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub file: FileId,
    pub change_count: usize,
    pub rules: Vec<RuleNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleNode {
    pub selector: String,
    pub media: Option<String>,
    pub declarations: Vec<DeclarationNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationNode {
    pub id: ChangeId,
    /// Rendered declaration, e.g. `color: black -> red`
    pub label: String,
    pub operation: &'static str,
    pub via_variable: Option<String>,
}

impl PendingTree {
    /// Project the current store contents
    pub fn project(store: &PendingStore) -> Self {
        let files = store
            .files()
            .map(|(file, group)| FileNode {
                file: file.clone(),
                change_count: group.change_count(),
                rules: group
                    .rules()
                    .map(|(rule, changes)| RuleNode {
                        selector: rule.selector.clone(),
                        media: rule.media.clone(),
                        declarations: changes
                            .declarations()
                            .iter()
                            .map(|c| DeclarationNode {
                                id: c.id,
                                label: c.summary(),
                                operation: c.operation.label(),
                                via_variable: c.via_variable.clone(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Self { files }
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total number of pending changes
    pub fn change_count(&self) -> usize {
        self.files.iter().map(|f| f.change_count).sum()
    }

    /// Render as indented text; declarations are omitted unless `expand`
    pub fn render(&self, expand: bool) -> String {
        let mut out = String::new();
        for file in &self.files {
            let _ = writeln!(out, "{} ({})", file.file, file.change_count);
            for rule in &file.rules {
                match &rule.media {
                    Some(media) => {
                        let _ = writeln!(out, "  @media {} {{ {} }}", media, rule.selector);
                    }
                    None => {
                        let _ = writeln!(out, "  {}", rule.selector);
                    }
                }
                if !expand {
                    continue;
                }
                for decl in &rule.declarations {
                    let _ = write!(out, "    {} {}", decl.id, decl.label);
                    if let Some(var) = &decl.via_variable {
                        let _ = write!(out, " (via {})", var);
                    }
                    out.push('\n');
                }
            }
        }
        out
    }
}
