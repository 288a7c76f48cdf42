//! Filesystem-backed project
//!
//! Implements the collaborator traits over plain `.css` files under a
//! project root. Sources are re-read on every lookup and every write, so
//! edits made in an editor between two browser changes are picked up.

use crate::css::{self, Declaration, Stylesheet};
use bridge_core::event::normalize_whitespace;
use bridge_core::settings::STATE_DIR;
use bridge_core::{FileId, RouteResolution};
use journal::{
    ChangeSink, DeclarationHandle, FileLocator, FoundDeclaration, Operation, PendingChange,
    ResolutionError, ResolveOptions, StyleResolver, WriteError,
};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directories never scanned for stylesheets
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "target", STATE_DIR];

/// Stylesheets under a project root
#[derive(Debug, Clone)]
pub struct FsProject {
    root: PathBuf,
}

impl FsProject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All `.css` files under the root, sorted
    pub fn stylesheets(&self) -> Vec<PathBuf> {
        let mut sheets: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry.depth() > 0
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIP_DIRS.contains(&name)))
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_stylesheet(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        sheets.sort();
        sheets
    }

    fn parse_for_lookup(&self, file: &FileId) -> Result<Stylesheet, ResolutionError> {
        let text = std::fs::read_to_string(file.path()).map_err(|source| ResolutionError::Io {
            file: file.path().to_path_buf(),
            source,
        })?;
        css::parse(&text).map_err(|e| ResolutionError::Parse {
            file: file.path().to_path_buf(),
            message: e.to_string(),
        })
    }

    fn parse_for_write(&self, file: &FileId) -> Result<(String, Stylesheet), WriteError> {
        let text = std::fs::read_to_string(file.path()).map_err(|source| WriteError::Io {
            file: file.path().to_path_buf(),
            source,
        })?;
        let sheet = css::parse(&text)
            .map_err(|e| WriteError::Rejected(format!("{}: {}", file, e)))?;
        Ok((text, sheet))
    }

    fn store(&self, file: &FileId, text: &str) -> Result<(), WriteError> {
        std::fs::write(file.path(), text).map_err(|source| WriteError::Io {
            file: file.path().to_path_buf(),
            source,
        })
    }

    fn update(&self, change: &PendingChange, handle: &DeclarationHandle) -> Result<(), WriteError> {
        let (text, sheet) = self.parse_for_write(&handle.file)?;
        let declaration = locate(&sheet, handle).ok_or_else(|| missing(handle))?;

        if let Some(original) = change.original_value.as_deref() {
            if declaration.value != original {
                return Err(WriteError::Conflict(format!(
                    "{} {} is now '{}', expected '{}'",
                    handle.selector, handle.property, declaration.value, original
                )));
            }
        }

        let patched = css::replace_value(&text, declaration, &change.value, change.important);
        self.store(&handle.file, &patched)
    }

    fn insert(&self, change: &PendingChange) -> Result<(), WriteError> {
        let (text, sheet) = self.parse_for_write(&change.file)?;
        let selector = normalize_whitespace(&change.selector);
        let media = change.media.as_deref().map(normalize_whitespace);

        let rule = sheet
            .rules
            .iter()
            .rev()
            .find(|rule| rule.media == media && rule.matches(&selector));
        let patched = match rule {
            Some(rule) => css::insert_declaration(&text, rule, &change.declaration_text()),
            None => {
                debug!("No rule for {} in {}, appending one", selector, change.file);
                css::append_rule(&text, &selector, media.as_deref(), &change.declaration_text())
            }
        };
        self.store(&change.file, &patched)
    }
}

impl FileLocator for FsProject {
    fn candidates_for(
        &self,
        route: Option<&RouteResolution>,
        _open_files: &[FileId],
        _filename_hint: Option<&str>,
    ) -> Vec<FileId> {
        let mut sheets = self.stylesheets();
        let routed = route
            .filter(|r| stays_inside(&r.relative_path))
            .map(RouteResolution::local_path);
        if let Some(local) = routed {
            if local.is_file() && is_stylesheet(&local) && !sheets.contains(&local) {
                sheets.push(local);
            }
        }
        sheets.into_iter().map(FileId::from).collect()
    }
}

impl StyleResolver for FsProject {
    fn find_declarations(
        &self,
        file: &FileId,
        selector: &str,
        property: &str,
        _options: ResolveOptions,
    ) -> Result<Vec<FoundDeclaration>, ResolutionError> {
        let sheet = self.parse_for_lookup(file)?;
        let selector = normalize_whitespace(selector);
        let property = property.trim().to_ascii_lowercase();

        let mut ordinals: HashMap<(&str, Option<&str>), usize> = HashMap::new();
        let mut found = Vec::new();
        for rule in &sheet.rules {
            for declaration in rule.declarations.iter().filter(|d| d.property == property) {
                let ordinal = ordinals
                    .entry((rule.selector.as_str(), rule.media.as_deref()))
                    .or_insert(0);
                let index = *ordinal;
                *ordinal += 1;

                if rule.matches(&selector) {
                    found.push(FoundDeclaration {
                        handle: DeclarationHandle {
                            file: file.clone(),
                            selector: rule.selector.clone(),
                            media: rule.media.clone(),
                            property: property.clone(),
                            index,
                        },
                        value: declaration.value.clone(),
                        important: declaration.important,
                    });
                }
            }
        }
        Ok(found)
    }
}

impl ChangeSink for FsProject {
    fn write_declaration(&mut self, change: &PendingChange) -> Result<(), WriteError> {
        match &change.operation {
            Operation::Insert => self.insert(change)?,
            Operation::Update(handle) => self.update(change, handle)?,
            Operation::Remove(handle) => return self.remove_declaration(handle),
        }
        info!("Wrote {} to {}", change.declaration_text(), change.file);
        Ok(())
    }

    fn remove_declaration(&mut self, handle: &DeclarationHandle) -> Result<(), WriteError> {
        let (text, sheet) = self.parse_for_write(&handle.file)?;
        let declaration = locate(&sheet, handle).ok_or_else(|| missing(handle))?;
        let patched = css::remove_declaration(&text, declaration);
        self.store(&handle.file, &patched)?;
        info!("Removed {} from {} in {}", handle.property, handle.selector, handle.file);
        Ok(())
    }
}

fn stays_inside(relative: &Path) -> bool {
    relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn is_stylesheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
}

/// Find a declaration again by its ordinal
fn locate<'s>(sheet: &'s Stylesheet, handle: &DeclarationHandle) -> Option<&'s Declaration> {
    sheet
        .rules
        .iter()
        .filter(|rule| rule.selector == handle.selector && rule.media == handle.media)
        .flat_map(|rule| rule.declarations.iter())
        .filter(|d| d.property == handle.property)
        .nth(handle.index)
}

fn missing(handle: &DeclarationHandle) -> WriteError {
    WriteError::Conflict(format!(
        "{} {} #{} no longer exists in {}",
        handle.selector, handle.property, handle.index, handle.file
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::{ChangeEvent, RuleChange, Settings};
    use journal::{EngineAction, ReductionEngine};
    use tempfile::TempDir;

    const URL: &str = "http://localhost:8080/css/main.css";

    fn project(files: &[(&str, &str)]) -> (TempDir, FsProject) {
        let temp_dir = TempDir::new().unwrap();
        for (path, contents) in files {
            let full = temp_dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, contents).unwrap();
        }
        let project = FsProject::new(temp_dir.path());
        (temp_dir, project)
    }

    fn read(temp_dir: &TempDir, path: &str) -> String {
        std::fs::read_to_string(temp_dir.path().join(path)).unwrap()
    }

    fn file(temp_dir: &TempDir, path: &str) -> FileId {
        FileId::new(temp_dir.path().join(path))
    }

    /// Ingest one change into a single file and apply everything pending
    fn apply(project: &mut FsProject, target: &FileId, change: RuleChange) -> journal::ApplyReport {
        let mut engine = ReductionEngine::new(Settings::default());
        let action = engine.ingest(&ChangeEvent::rule(URL, change), &[target.clone()], &*project);
        assert!(matches!(action, EngineAction::Updated(_)), "{:?}", action);
        engine.store_mut().apply_all(project)
    }

    #[test]
    fn test_stylesheets_skip_vendor_dirs() {
        let (_temp, project) = project(&[
            ("b.css", ""),
            ("css/a.CSS", ""),
            ("css/readme.md", ""),
            ("node_modules/lib/x.css", ""),
            (".cssbridge/cache.css", ""),
        ]);

        let names: Vec<_> = project
            .stylesheets()
            .iter()
            .map(|p| p.strip_prefix(project.root()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("b.css"), PathBuf::from("css/a.CSS")]);
    }

    #[test]
    fn test_candidates_include_routed_file() {
        let (temp, project) = project(&[("a.css", "")]);
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("main.css"), "").unwrap();

        let route = RouteResolution {
            local_directory: outside.path().to_path_buf(),
            relative_path: PathBuf::from("main.css"),
        };
        let candidates = project.candidates_for(Some(&route), &[], None);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], file(&temp, "a.css"));
        assert_eq!(candidates[1].path(), outside.path().join("main.css"));

        let missing = RouteResolution {
            local_directory: outside.path().to_path_buf(),
            relative_path: PathBuf::from("gone.css"),
        };
        assert_eq!(project.candidates_for(Some(&missing), &[], None).len(), 1);
    }

    #[test]
    fn test_candidates_skip_unsafe_routed_files() {
        let (temp, _) = project(&[("web/a.css", ""), ("notes.txt", ""), ("outside.css", "")]);

        let not_css = RouteResolution {
            local_directory: temp.path().to_path_buf(),
            relative_path: PathBuf::from("notes.txt"),
        };
        let escaping = RouteResolution {
            local_directory: temp.path().join("web"),
            relative_path: PathBuf::from("../outside.css"),
        };

        let project = FsProject::new(temp.path().join("web"));
        let only_web = vec![file(&temp, "web/a.css")];
        assert_eq!(project.candidates_for(Some(&not_css), &[], None), only_web);
        assert_eq!(project.candidates_for(Some(&escaping), &[], None), only_web);
    }

    #[test]
    fn test_find_declarations_with_ordinals() {
        let (temp, project) = project(&[(
            "a.css",
            ".a { color: red; }\n.a, .b { color: green; }\n.a { color: blue; }\n\
             @media print { .a { color: black; } }\n",
        )]);

        let found = project
            .find_declarations(&file(&temp, "a.css"), " .a ", "Color", ResolveOptions::default())
            .unwrap();
        let summary: Vec<_> = found
            .iter()
            .map(|f| (f.handle.selector.as_str(), f.media(), f.handle.index, f.value.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (".a", None, 0, "red"),
                (".a, .b", None, 0, "green"),
                (".a", None, 1, "blue"),
                (".a", Some("print"), 0, "black"),
            ]
        );
    }

    #[test]
    fn test_unparseable_file_is_reported() {
        let (temp, project) = project(&[("a.css", ".a { color: red;")]);
        let result = project.find_declarations(&file(&temp, "a.css"), ".a", "color", ResolveOptions::default());
        assert!(matches!(result, Err(ResolutionError::Parse { .. })));
    }

    #[test]
    fn test_update_in_place() {
        let (temp, mut project) = project(&[("a.css", ".a {\n  color: red;\n}\n")]);
        let target = file(&temp, "a.css");

        let report = apply(&mut project, &target, RuleChange::new(".a", "color", "blue").with_important(true));
        assert!(report.is_clean());
        assert_eq!(read(&temp, "a.css"), ".a {\n  color: blue !important;\n}\n");
    }

    #[test]
    fn test_update_conflicts_with_edited_source() {
        let (temp, mut project) = project(&[("a.css", ".a { color: red; }")]);
        let target = file(&temp, "a.css");

        let mut engine = ReductionEngine::new(Settings::default());
        engine.ingest(
            &ChangeEvent::rule(URL, RuleChange::new(".a", "color", "blue")),
            &[target.clone()],
            &project,
        );
        std::fs::write(target.path(), ".a { color: green; }").unwrap();

        let report = engine.store_mut().apply_all(&mut project);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, WriteError::Conflict(_)));
        assert_eq!(read(&temp, "a.css"), ".a { color: green; }");
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_insert_into_existing_rule() {
        let (temp, mut project) = project(&[("a.css", ".a {\n  color: red;\n}\n")]);
        let target = file(&temp, "a.css");

        assert!(apply(&mut project, &target, RuleChange::new(".a", "margin", "0 auto")).is_clean());
        assert_eq!(read(&temp, "a.css"), ".a {\n  color: red;\n  margin: 0 auto;\n}\n");
    }

    #[test]
    fn test_insert_creates_media_rule() {
        let (temp, mut project) = project(&[("a.css", ".a { color: red; }\n")]);
        let target = file(&temp, "a.css");

        let change = RuleChange::new(".a", "margin", "0").with_media(Some("print"));
        assert!(apply(&mut project, &target, change).is_clean());

        let text = read(&temp, "a.css");
        assert!(text.starts_with(".a { color: red; }\n"));
        assert!(text.contains("@media print {\n  .a {\n    margin: 0;\n  }\n}\n"));
    }

    #[test]
    fn test_remove_declaration() {
        let (temp, mut project) = project(&[("a.css", ".a {\n  color: red;\n  margin: 0;\n}\n")]);
        let target = file(&temp, "a.css");

        assert!(apply(&mut project, &target, RuleChange::new(".a", "color", "")).is_clean());
        assert_eq!(read(&temp, "a.css"), ".a {\n  margin: 0;\n}\n");
    }

    #[test]
    fn test_remove_missing_is_conflict() {
        let (temp, mut project) = project(&[("a.css", ".a { margin: 0; }")]);
        let handle = DeclarationHandle {
            file: file(&temp, "a.css"),
            selector: ".a".into(),
            media: None,
            property: "color".into(),
            index: 0,
        };
        assert!(matches!(project.remove_declaration(&handle), Err(WriteError::Conflict(_))));
    }
}
