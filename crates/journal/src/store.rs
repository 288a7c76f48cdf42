//! Pending change store
//!
//! Changes are grouped by file, then by rule (selector + media), then kept
//! in `sequence` order inside the rule. Groups exist only while they hold at
//! least one change: removing the last declaration of a rule drops the rule,
//! and dropping the last rule of a file drops the file.

use crate::change::{ChangeDraft, ChangeId, ChangeKey, Operation, PendingChange, RuleKey};
use crate::collab::{ChangeSink, WriteError};
use ahash::AHashMap;
use bridge_core::FileId;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no pending change {0}")]
    UnknownChange(ChangeId),

    #[error("failed to apply {id}: {source}")]
    Write {
        id: ChangeId,
        #[source]
        source: WriteError,
    },
}

/// Part of the store an operation covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every pending change
    All,
    /// Every change in one file
    File(FileId),
    /// Every change in one rule of a file
    Rule { file: FileId, rule: RuleKey },
    /// A single change
    Change(ChangeId),
}

/// Outcome of applying several changes
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Changes written and removed from the store
    pub applied: Vec<ChangeId>,
    /// Changes the sink refused; these stay pending
    pub failed: Vec<(ChangeId, WriteError)>,
}

impl ApplyReport {
    /// Check if every change was applied
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Changes of one rule, ordered by sequence
#[derive(Debug, Default)]
pub struct RuleGroup {
    declarations: Vec<PendingChange>,
}

impl RuleGroup {
    /// Declarations in sequence order
    pub fn declarations(&self) -> &[PendingChange] {
        &self.declarations
    }
}

/// Changes of one file, grouped by rule
#[derive(Debug, Default)]
pub struct FileGroup {
    rules: BTreeMap<RuleKey, RuleGroup>,
}

impl FileGroup {
    /// Rules in stable order
    pub fn rules(&self) -> impl Iterator<Item = (&RuleKey, &RuleGroup)> {
        self.rules.iter()
    }

    /// Number of pending changes in the file
    pub fn change_count(&self) -> usize {
        self.rules.values().map(|r| r.declarations.len()).sum()
    }
}

/// Session-scoped collection of pending changes
#[derive(Debug)]
pub struct PendingStore {
    files: BTreeMap<FileId, FileGroup>,
    /// change id -> key, for direct lookup
    index: AHashMap<ChangeId, ChangeKey>,
    next_id: u64,
    next_sequence: u64,
}

impl Default for PendingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            index: AHashMap::new(),
            next_id: 1,
            next_sequence: 1,
        }
    }

    /// Create a change, or refresh the one with the same key in place
    ///
    /// Either way the entry gets a fresh sequence number and moves to the
    /// end of its rule group.
    pub fn upsert(&mut self, draft: ChangeDraft) -> ChangeId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let group = self
            .files
            .entry(draft.key.file.clone())
            .or_default()
            .rules
            .entry(draft.key.rule.clone())
            .or_default();

        if let Some(pos) = group
            .declarations
            .iter()
            .position(|c| c.property == draft.key.property)
        {
            let mut change = group.declarations.remove(pos);
            change.refresh(sequence, draft);
            let id = change.id;
            group.declarations.push(change);
            debug!("Refreshed pending change {} (seq {})", id, sequence);
            return id;
        }

        let id = ChangeId(self.next_id);
        self.next_id += 1;
        self.index.insert(id, draft.key.clone());
        group.declarations.push(PendingChange::from_draft(id, sequence, draft));
        debug!("Created pending change {} (seq {})", id, sequence);
        id
    }

    /// Look up a change by id
    pub fn get(&self, id: ChangeId) -> Option<&PendingChange> {
        let key = self.index.get(&id)?;
        self.find(key)
    }

    /// Look up a change by key
    pub fn find(&self, key: &ChangeKey) -> Option<&PendingChange> {
        self.files
            .get(&key.file)?
            .rules
            .get(&key.rule)?
            .declarations
            .iter()
            .find(|c| c.property == key.property)
    }

    /// Remove a change, pruning empty groups
    pub fn remove(&mut self, id: ChangeId) -> Option<PendingChange> {
        let key = self.index.remove(&id)?;

        let file_group = self.files.get_mut(&key.file)?;
        let rule_group = file_group.rules.get_mut(&key.rule)?;
        let pos = rule_group.declarations.iter().position(|c| c.id == id)?;
        let change = rule_group.declarations.remove(pos);

        if rule_group.declarations.is_empty() {
            file_group.rules.remove(&key.rule);
        }
        if file_group.rules.is_empty() {
            self.files.remove(&key.file);
        }
        Some(change)
    }

    /// Remove every change matching `predicate`, returning how many went
    pub fn remove_where(&mut self, predicate: impl Fn(&PendingChange) -> bool) -> usize {
        let doomed: Vec<ChangeId> = self.iter().filter(|c| predicate(c)).map(|c| c.id).collect();
        for id in &doomed {
            self.remove(*id);
        }
        doomed.len()
    }

    /// All changes in display order: file, rule, then sequence
    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.files
            .values()
            .flat_map(|f| f.rules.values())
            .flat_map(|r| r.declarations.iter())
    }

    /// Files with pending changes, in stable order
    pub fn files(&self) -> impl Iterator<Item = (&FileId, &FileGroup)> {
        self.files.iter()
    }

    /// Ids covered by a scope, in display order
    pub fn ids_in(&self, scope: &Scope) -> Vec<ChangeId> {
        match scope {
            Scope::All => self.iter().map(|c| c.id).collect(),
            Scope::File(file) => self
                .files
                .get(file)
                .map(|f| {
                    f.rules
                        .values()
                        .flat_map(|r| r.declarations.iter().map(|c| c.id))
                        .collect()
                })
                .unwrap_or_default(),
            Scope::Rule { file, rule } => self
                .files
                .get(file)
                .and_then(|f| f.rules.get(rule))
                .map(|r| r.declarations.iter().map(|c| c.id).collect())
                .unwrap_or_default(),
            Scope::Change(id) => self.get(*id).map(|c| vec![c.id]).unwrap_or_default(),
        }
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of pending changes in one file
    pub fn file_count(&self, file: &FileId) -> usize {
        self.files.get(file).map(FileGroup::change_count).unwrap_or(0)
    }

    /// Highest sequence number handed out so far (0 if none)
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Write one change through the sink, then drop it
    ///
    /// On a sink failure the change stays pending and the error is returned.
    pub fn apply(&mut self, id: ChangeId, sink: &mut dyn ChangeSink) -> Result<(), StoreError> {
        let change = self.get(id).ok_or(StoreError::UnknownChange(id))?;

        let result = match &change.operation {
            Operation::Remove(handle) => sink.remove_declaration(handle),
            Operation::Insert | Operation::Update(_) => sink.write_declaration(change),
        };

        match result {
            Ok(()) => {
                self.remove(id);
                debug!("Applied pending change {}", id);
                Ok(())
            }
            Err(source) => {
                warn!("Keeping pending change {}: {}", id, source);
                Err(StoreError::Write { id, source })
            }
        }
    }

    /// Apply every change in a scope, in display order
    pub fn apply_scope(&mut self, scope: &Scope, sink: &mut dyn ChangeSink) -> ApplyReport {
        let mut report = ApplyReport::default();
        for id in self.ids_in(scope) {
            match self.apply(id, sink) {
                Ok(()) => report.applied.push(id),
                Err(StoreError::Write { id, source }) => report.failed.push((id, source)),
                Err(StoreError::UnknownChange(_)) => {}
            }
        }
        report
    }

    /// Apply everything pending
    pub fn apply_all(&mut self, sink: &mut dyn ChangeSink) -> ApplyReport {
        self.apply_scope(&Scope::All, sink)
    }

    /// Drop a change without writing it
    pub fn discard(&mut self, id: ChangeId) -> Option<PendingChange> {
        self.remove(id)
    }

    /// Drop every change in a scope, returning how many went
    pub fn discard_scope(&mut self, scope: &Scope) -> usize {
        let ids = self.ids_in(scope);
        for id in &ids {
            self.remove(*id);
        }
        ids.len()
    }

    /// Drop everything pending
    pub fn discard_all(&mut self) -> usize {
        let count = self.len();
        self.files.clear();
        self.index.clear();
        count
    }

    /// Next change after `anchor` in display order, wrapping around
    ///
    /// Without an anchor (or with an unknown one) starts at the first change.
    pub fn next(&self, anchor: Option<ChangeId>) -> Option<ChangeId> {
        let ids: Vec<ChangeId> = self.iter().map(|c| c.id).collect();
        let first = *ids.first()?;
        match anchor.and_then(|a| ids.iter().position(|id| *id == a)) {
            Some(pos) => Some(ids[(pos + 1) % ids.len()]),
            None => Some(first),
        }
    }

    /// Previous change before `anchor` in display order, wrapping around
    ///
    /// Without an anchor (or with an unknown one) starts at the last change.
    pub fn previous(&self, anchor: Option<ChangeId>) -> Option<ChangeId> {
        let ids: Vec<ChangeId> = self.iter().map(|c| c.id).collect();
        let last = *ids.last()?;
        match anchor.and_then(|a| ids.iter().position(|id| *id == a)) {
            Some(pos) => Some(ids[(pos + ids.len() - 1) % ids.len()]),
            None => Some(last),
        }
    }

    /// Check if moving forward leads somewhere new
    ///
    /// With one change this is only true while it is not already selected.
    pub fn has_next(&self, selected: Option<ChangeId>) -> bool {
        match self.len() {
            0 => false,
            1 => selected.map_or(true, |id| self.get(id).is_none()),
            _ => true,
        }
    }

    /// Check if moving backward leads somewhere new
    pub fn has_previous(&self) -> bool {
        self.len() > 1
    }
}
