//! Reduction engine
//!
//! Turns browser events into pending changes. The engine owns the pending
//! store for one session and asks a [`StyleResolver`] what each candidate
//! file currently declares; it never reads or writes files itself.

use crate::change::{ChangeDraft, ChangeId, ChangeKey, Operation};
use crate::collab::{FoundDeclaration, ResolutionError, ResolveOptions, StyleResolver};
use crate::store::{PendingStore, Scope};
use crate::strategy::same_media;
use bridge_core::location::is_under;
use bridge_core::{ChangeEvent, EventKind, FileId, RuleChange, Settings};
use tracing::{debug, info, warn};

/// What ingesting one event did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// A reload removed this many pending changes
    Cleared(usize),
    /// No candidate produced a change
    NoTarget,
    /// Pending changes created, updated or retracted, one per target
    Updated(Vec<ChangeId>),
}

/// Pending change bookkeeping for one session
#[derive(Debug, Default)]
pub struct ReductionEngine {
    settings: Settings,
    store: PendingStore,
}

impl ReductionEngine {
    /// Create an engine with an empty store
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: PendingStore::new(),
        }
    }

    /// Current settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace settings; pending changes are kept
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Pending changes
    pub fn store(&self) -> &PendingStore {
        &self.store
    }

    /// Pending changes, for apply/discard
    pub fn store_mut(&mut self) -> &mut PendingStore {
        &mut self.store
    }

    /// Process one event against already-reduced candidate files
    ///
    /// Every candidate receives the change. A candidate the resolver
    /// cannot read is logged and skipped.
    pub fn ingest(
        &mut self,
        event: &ChangeEvent,
        candidates: &[FileId],
        resolver: &dyn StyleResolver,
    ) -> EngineAction {
        let change = match &event.kind {
            EventKind::PageReload => return self.reload(&event.document_url),
            EventKind::RuleChange(change) => change,
        };

        if candidates.is_empty() {
            debug!("No candidate files for {}", event.document_url);
            return EngineAction::NoTarget;
        }

        let mut touched = Vec::with_capacity(candidates.len());
        for file in candidates {
            match self.ingest_target(&event.document_url, change, file, resolver) {
                Ok(Some(id)) => touched.push(id),
                Ok(None) => {}
                Err(e) => warn!("Skipping {}: {}", file, e),
            }
        }

        if touched.is_empty() {
            EngineAction::NoTarget
        } else {
            EngineAction::Updated(touched)
        }
    }

    /// Forget pending changes of a file that is no longer open
    ///
    /// Only applies while the open-files reduction is enabled.
    pub fn file_closed(&mut self, file: &FileId) -> usize {
        if !self.settings.current_documents_reduce {
            return 0;
        }
        let removed = self.store.discard_scope(&Scope::File(file.clone()));
        if removed > 0 {
            info!("Dropped {} pending change(s) of closed {}", removed, file);
        }
        removed
    }

    fn reload(&mut self, page_url: &str) -> EngineAction {
        if !self.settings.auto_clear {
            return EngineAction::Cleared(0);
        }
        let removed = self
            .store
            .remove_where(|change| is_under(&change.document_url, page_url));
        if removed > 0 {
            info!("Reload of {} cleared {} pending change(s)", page_url, removed);
        }
        EngineAction::Cleared(removed)
    }

    fn ingest_target(
        &mut self,
        document_url: &str,
        change: &RuleChange,
        file: &FileId,
        resolver: &dyn StyleResolver,
    ) -> Result<Option<ChangeId>, ResolutionError> {
        let options = ResolveOptions {
            mixins: self.settings.resolve_mixins,
        };
        let found = resolver.find_declarations(file, &change.selector, &change.property, options)?;
        let chosen = self.choose(found, change.media.as_deref());

        let (target, via_variable) = match chosen {
            Some(declaration) if self.settings.resolve_variables && !change.is_removal() => {
                self.follow_variable(declaration, resolver)?
            }
            other => (other, None),
        };

        let draft = match target {
            Some(declaration) => {
                let operation = if change.is_removal() {
                    Operation::Remove(declaration.handle.clone())
                } else {
                    Operation::Update(declaration.handle.clone())
                };
                ChangeDraft {
                    key: ChangeKey::for_handle(&declaration.handle),
                    value: change.value.clone(),
                    important: change.important,
                    operation,
                    original_value: Some(declaration.value),
                    via_variable,
                    document_url: document_url.to_string(),
                }
            }
            None => {
                let key = ChangeKey::new(
                    file.clone(),
                    &change.selector,
                    change.media.as_deref(),
                    &change.property,
                );
                if change.is_removal() {
                    return Ok(self.retract_insert(&key));
                }
                ChangeDraft {
                    key,
                    value: change.value.clone(),
                    important: change.important,
                    operation: Operation::Insert,
                    original_value: None,
                    via_variable: None,
                    document_url: document_url.to_string(),
                }
            }
        };

        Ok(Some(self.store.upsert(draft)))
    }

    /// Pick the declaration a change applies to
    fn choose(
        &self,
        found: Vec<FoundDeclaration>,
        media: Option<&str>,
    ) -> Option<FoundDeclaration> {
        let exact = |d: &FoundDeclaration| same_media(d.media(), media);

        if self.settings.media_reduce {
            match media {
                Some(_) => {
                    let mut unscoped = None;
                    for declaration in found {
                        if exact(&declaration) {
                            return Some(declaration);
                        }
                        if unscoped.is_none() && declaration.media().is_none() {
                            unscoped = Some(declaration);
                        }
                    }
                    unscoped
                }
                None => found.into_iter().find(|d| d.media().is_none()),
            }
        } else {
            match found.iter().position(exact) {
                Some(idx) => found.into_iter().nth(idx),
                None => found.into_iter().next(),
            }
        }
    }

    /// Redirect onto a variable assignment when the value is a bare reference
    fn follow_variable(
        &self,
        declaration: FoundDeclaration,
        resolver: &dyn StyleResolver,
    ) -> Result<(Option<FoundDeclaration>, Option<String>), ResolutionError> {
        let Some(name) = variable_reference(&declaration.value) else {
            return Ok((Some(declaration), None));
        };
        match resolver.resolve_variable(name, &declaration.handle)? {
            Some(assignment) => {
                debug!("Redirecting {} onto variable {}", declaration.handle.property, name);
                let name = name.to_string();
                Ok((Some(assignment), Some(name)))
            }
            None => Ok((Some(declaration), None)),
        }
    }

    /// Undo a pending insert for a declaration the browser removed again
    fn retract_insert(&mut self, key: &ChangeKey) -> Option<ChangeId> {
        let id = self
            .store
            .find(key)
            .filter(|c| c.operation == Operation::Insert)
            .map(|c| c.id)?;
        self.store.remove(id);
        debug!("Retracted pending insert {}", id);
        Some(id)
    }
}

/// Variable name if `value` is a single `@name` or `$name` reference
pub fn variable_reference(value: &str) -> Option<&str> {
    let value = value.trim();
    let mut chars = value.chars();
    if !matches!(chars.next(), Some('@' | '$')) {
        return None;
    }
    let mut body = chars.peekable();
    let first = *body.peek()?;
    if !(first.is_ascii_alphabetic() || first == '_' || first == '-') {
        return None;
    }
    if body.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::PendingChange;
    use crate::collab::{ChangeSink, DeclarationHandle, WriteError};
    use std::collections::HashMap;

    const PAGE: &str = "http://localhost:8080/app/index.html";
    const SHEET: &str = "http://localhost:8080/app/css/main.css";

    /// In-memory resolver: file -> declarations, plus variable assignments
    #[derive(Default)]
    struct FakeResolver {
        declarations: HashMap<FileId, Vec<FoundDeclaration>>,
        variables: HashMap<String, FoundDeclaration>,
        broken: Vec<FileId>,
    }

    impl FakeResolver {
        fn declare(&mut self, file: &str, selector: &str, media: Option<&str>, property: &str, value: &str) {
            let file = FileId::new(file);
            let list = self.declarations.entry(file.clone()).or_default();
            let index = list.len();
            list.push(FoundDeclaration {
                handle: DeclarationHandle {
                    file,
                    selector: selector.to_string(),
                    media: media.map(str::to_string),
                    property: property.to_string(),
                    index,
                },
                value: value.to_string(),
                important: false,
            });
        }

        fn variable(&mut self, file: &str, name: &str, value: &str) {
            self.variables.insert(
                name.to_string(),
                FoundDeclaration {
                    handle: DeclarationHandle {
                        file: FileId::new(file),
                        selector: String::new(),
                        media: None,
                        property: name.to_string(),
                        index: 0,
                    },
                    value: value.to_string(),
                    important: false,
                },
            );
        }
    }

    impl StyleResolver for FakeResolver {
        fn find_declarations(
            &self,
            file: &FileId,
            selector: &str,
            property: &str,
            _options: ResolveOptions,
        ) -> Result<Vec<FoundDeclaration>, ResolutionError> {
            if self.broken.contains(file) {
                return Err(ResolutionError::Parse {
                    file: file.path().to_path_buf(),
                    message: "unbalanced braces".into(),
                });
            }
            Ok(self
                .declarations
                .get(file)
                .map(|list| {
                    list.iter()
                        .filter(|d| d.handle.selector == selector && d.handle.property == property)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        fn resolve_variable(
            &self,
            name: &str,
            _scope: &DeclarationHandle,
        ) -> Result<Option<FoundDeclaration>, ResolutionError> {
            Ok(self.variables.get(name).cloned())
        }
    }

    #[derive(Default)]
    struct NullSink;

    impl ChangeSink for NullSink {
        fn write_declaration(&mut self, _change: &PendingChange) -> Result<(), WriteError> {
            Ok(())
        }

        fn remove_declaration(&mut self, _handle: &DeclarationHandle) -> Result<(), WriteError> {
            Ok(())
        }
    }

    fn change_event(selector: &str, property: &str, value: &str) -> ChangeEvent {
        ChangeEvent::rule(SHEET, RuleChange::new(selector, property, value))
    }

    fn media_event(selector: &str, property: &str, value: &str, media: &str) -> ChangeEvent {
        ChangeEvent::rule(
            SHEET,
            RuleChange::new(selector, property, value).with_media(Some(media)),
        )
    }

    fn updated(action: EngineAction) -> Vec<ChangeId> {
        match action {
            EngineAction::Updated(ids) => ids,
            other => panic!("expected Updated, got {:?}", other),
        }
    }

    #[test]
    fn test_new_declaration_is_inserted() {
        let mut engine = ReductionEngine::default();
        let resolver = FakeResolver::default();
        let file = FileId::new("/proj/main.css");

        let before = engine.store().last_sequence();
        let ids = updated(engine.ingest(&change_event(".foo", "color", "red"), &[file], &resolver));

        assert_eq!(ids.len(), 1);
        let change = engine.store().get(ids[0]).unwrap();
        assert_eq!(change.operation, Operation::Insert);
        assert!(change.sequence > before);
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_same_event_twice_updates_in_place() {
        let mut engine = ReductionEngine::default();
        let resolver = FakeResolver::default();
        let files = [FileId::new("/proj/main.css")];
        let event = change_event(".foo", "color", "red");

        let first = updated(engine.ingest(&event, &files, &resolver));
        let seq = engine.store().get(first[0]).unwrap().sequence;
        let second = updated(engine.ingest(&event, &files, &resolver));

        assert_eq!(first, second);
        assert_eq!(engine.store().len(), 1);
        assert!(engine.store().get(second[0]).unwrap().sequence > seq);
    }

    #[test]
    fn test_existing_declaration_updates_then_removes() {
        let mut engine = ReductionEngine::default();
        let mut resolver = FakeResolver::default();
        resolver.declare("/proj/main.css", ".foo", None, "color", "black");
        let files = [FileId::new("/proj/main.css")];

        let ids = updated(engine.ingest(&change_event(".foo", "color", "red"), &files, &resolver));
        let change = engine.store().get(ids[0]).unwrap();
        assert!(matches!(change.operation, Operation::Update(_)));
        assert_eq!(change.original_value.as_deref(), Some("black"));

        let again = updated(engine.ingest(&change_event(".foo", "color", ""), &files, &resolver));
        assert_eq!(again, ids);
        let change = engine.store().get(ids[0]).unwrap();
        assert!(matches!(change.operation, Operation::Remove(_)));
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_removing_unknown_declaration_retracts_insert() {
        let mut engine = ReductionEngine::default();
        let resolver = FakeResolver::default();
        let files = [FileId::new("/proj/main.css")];

        assert_eq!(
            engine.ingest(&change_event(".foo", "color", ""), &files, &resolver),
            EngineAction::NoTarget
        );

        engine.ingest(&change_event(".foo", "color", "red"), &files, &resolver);
        assert_eq!(engine.store().len(), 1);
        engine.ingest(&change_event(".foo", "color", ""), &files, &resolver);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_broadcast_to_every_candidate() {
        let mut engine = ReductionEngine::default();
        let mut resolver = FakeResolver::default();
        resolver.declare("/proj/a.css", ".foo", None, "color", "black");
        resolver.declare("/proj/b.css", ".foo", None, "color", "blue");
        let files = [FileId::new("/proj/a.css"), FileId::new("/proj/b.css")];

        let ids = updated(engine.ingest(&change_event(".foo", "color", "red"), &files, &resolver));
        assert_eq!(ids.len(), 2);
        assert_eq!(engine.store().len(), 2);
        assert_eq!(engine.store().files().count(), 2);
    }

    #[test]
    fn test_no_candidates() {
        let mut engine = ReductionEngine::default();
        let resolver = FakeResolver::default();
        assert_eq!(
            engine.ingest(&change_event(".foo", "color", "red"), &[], &resolver),
            EngineAction::NoTarget
        );
    }

    #[test]
    fn test_resolution_error_skips_only_that_target() {
        let mut engine = ReductionEngine::default();
        let mut resolver = FakeResolver::default();
        resolver.broken.push(FileId::new("/proj/broken.css"));
        let files = [FileId::new("/proj/broken.css"), FileId::new("/proj/ok.css")];

        let ids = updated(engine.ingest(&change_event(".foo", "color", "red"), &files, &resolver));
        assert_eq!(ids.len(), 1);
        assert_eq!(
            engine.store().get(ids[0]).unwrap().file,
            FileId::new("/proj/ok.css")
        );
    }

    #[test]
    fn test_reload_clears_under_page() {
        let mut engine = ReductionEngine::default();
        let resolver = FakeResolver::default();
        let files = [FileId::new("/proj/main.css")];
        engine.ingest(&change_event(".foo", "color", "red"), &files, &resolver);
        engine.ingest(
            &ChangeEvent::rule("http://localhost:8080/other/x.css", RuleChange::new(".bar", "color", "red")),
            &files,
            &resolver,
        );

        assert_eq!(
            engine.ingest(&ChangeEvent::reload(PAGE), &[], &resolver),
            EngineAction::Cleared(1)
        );
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_reload_without_auto_clear_keeps_store() {
        let settings = Settings {
            auto_clear: false,
            ..Settings::default()
        };
        let mut engine = ReductionEngine::new(settings);
        let resolver = FakeResolver::default();
        engine.ingest(
            &change_event(".foo", "color", "red"),
            &[FileId::new("/proj/main.css")],
            &resolver,
        );

        assert_eq!(
            engine.ingest(&ChangeEvent::reload(PAGE), &[], &resolver),
            EngineAction::Cleared(0)
        );
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_media_tie_break() {
        let mut resolver = FakeResolver::default();
        resolver.declare("/p/a.css", ".foo", None, "color", "black");
        resolver.declare("/p/a.css", ".foo", Some("print"), "color", "gray");
        let files = [FileId::new("/p/a.css")];

        // Exact media wins
        let mut engine = ReductionEngine::default();
        let ids = updated(engine.ingest(&media_event(".foo", "color", "red", "print"), &files, &resolver));
        assert_eq!(engine.store().get(ids[0]).unwrap().media.as_deref(), Some("print"));

        // Unknown media falls back to the unscoped declaration
        let mut engine = ReductionEngine::default();
        let ids = updated(engine.ingest(&media_event(".foo", "color", "red", "screen"), &files, &resolver));
        let change = engine.store().get(ids[0]).unwrap();
        assert_eq!(change.media, None);
        assert_eq!(change.original_value.as_deref(), Some("black"));

        // No event media only matches unscoped declarations
        let mut only_print = FakeResolver::default();
        only_print.declare("/p/a.css", ".foo", Some("print"), "color", "gray");
        let mut engine = ReductionEngine::default();
        let ids = updated(engine.ingest(&change_event(".foo", "color", "red"), &files, &only_print));
        assert_eq!(engine.store().get(ids[0]).unwrap().operation, Operation::Insert);
    }

    #[test]
    fn test_media_reduce_off_takes_first() {
        let settings = Settings {
            media_reduce: false,
            ..Settings::default()
        };
        let mut resolver = FakeResolver::default();
        resolver.declare("/p/a.css", ".foo", Some("print"), "color", "gray");
        resolver.declare("/p/a.css", ".foo", None, "color", "black");

        let mut engine = ReductionEngine::new(settings);
        let ids = updated(engine.ingest(
            &change_event(".foo", "color", "red"),
            &[FileId::new("/p/a.css")],
            &resolver,
        ));
        assert_eq!(engine.store().get(ids[0]).unwrap().media, None);

        let ids = updated(engine.ingest(
            &media_event(".foo", "color", "red", "screen"),
            &[FileId::new("/p/a.css")],
            &resolver,
        ));
        assert_eq!(engine.store().get(ids[0]).unwrap().media.as_deref(), Some("print"));
    }

    #[test]
    fn test_variable_redirection() {
        let mut resolver = FakeResolver::default();
        resolver.declare("/p/a.less", ".foo", None, "color", "@brand");
        resolver.variable("/p/vars.less", "@brand", "#333");
        let files = [FileId::new("/p/a.less")];

        let mut engine = ReductionEngine::default();
        let ids = updated(engine.ingest(&change_event(".foo", "color", "red"), &files, &resolver));
        let change = engine.store().get(ids[0]).unwrap();
        assert_eq!(change.file, FileId::new("/p/vars.less"));
        assert_eq!(change.property, "@brand");
        assert_eq!(change.via_variable.as_deref(), Some("@brand"));
        assert_eq!(change.original_value.as_deref(), Some("#333"));

        let settings = Settings {
            resolve_variables: false,
            ..Settings::default()
        };
        let mut engine = ReductionEngine::new(settings);
        let ids = updated(engine.ingest(&change_event(".foo", "color", "red"), &files, &resolver));
        let change = engine.store().get(ids[0]).unwrap();
        assert_eq!(change.file, FileId::new("/p/a.less"));
        assert!(change.via_variable.is_none());
    }

    #[test]
    fn test_removal_skips_variable_redirection() {
        let mut resolver = FakeResolver::default();
        resolver.declare("/p/a.less", ".foo", None, "color", "@brand");
        resolver.variable("/p/vars.less", "@brand", "#333");
        let files = [FileId::new("/p/a.less")];

        let mut engine = ReductionEngine::default();
        let ids = updated(engine.ingest(&change_event(".foo", "color", ""), &files, &resolver));
        let change = engine.store().get(ids[0]).unwrap();

        assert_eq!(change.file, FileId::new("/p/a.less"));
        assert_eq!(change.property, "color");
        assert!(change.via_variable.is_none());
        assert_eq!(change.original_value.as_deref(), Some("@brand"));
        match &change.operation {
            Operation::Remove(handle) => {
                assert_eq!(handle.file, FileId::new("/p/a.less"));
                assert_eq!(handle.property, "color");
            }
            other => panic!("expected a removal, got {:?}", other),
        }
    }

    #[test]
    fn test_file_closed() {
        let mut engine = ReductionEngine::default();
        let resolver = FakeResolver::default();
        let file = FileId::new("/p/a.css");
        engine.ingest(&change_event(".foo", "color", "red"), &[file.clone()], &resolver);

        assert_eq!(engine.file_closed(&file), 1);
        assert!(engine.store().is_empty());

        engine.set_settings(Settings {
            current_documents_reduce: false,
            ..Settings::default()
        });
        engine.ingest(&change_event(".foo", "color", "red"), &[file.clone()], &resolver);
        assert_eq!(engine.file_closed(&file), 0);
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_apply_after_ingest() {
        let mut engine = ReductionEngine::default();
        let resolver = FakeResolver::default();
        engine.ingest(
            &change_event(".foo", "color", "red"),
            &[FileId::new("/p/a.css")],
            &resolver,
        );

        let report = engine.store_mut().apply_all(&mut NullSink);
        assert_eq!(report.applied.len(), 1);
        assert!(engine.store().is_empty());
    }

    #[test]
    fn test_variable_reference() {
        assert_eq!(variable_reference("@brand"), Some("@brand"));
        assert_eq!(variable_reference(" $main-color "), Some("$main-color"));
        assert_eq!(variable_reference("@brand @other"), None);
        assert_eq!(variable_reference("darken(@brand, 10%)"), None);
        assert_eq!(variable_reference("@"), None);
        assert_eq!(variable_reference("@1x"), None);
        assert_eq!(variable_reference("red"), None);
    }
}
