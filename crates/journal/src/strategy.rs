//! Candidate reduction
//!
//! A strategy is an ordered list of filters. Each filter narrows the
//! candidate set; a filter that would leave nothing is skipped and the
//! previous set carries forward, so reduction never turns a match into a
//! miss.

use crate::collab::{ResolveOptions, StyleResolver};
use bridge_core::event::normalize_whitespace;
use bridge_core::{FileId, RouteResolution, RuleChange, Settings};
use tracing::{debug, trace};

/// One reduction step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Keep the file the route table maps the document URL to
    RouteMatch,
    /// Keep files named like the last segment of the document URL
    FilenameMatch,
    /// Keep files currently open in the editor
    OpenFiles,
    /// Keep files declaring the property under the event's `@media`
    MediaMatch,
}

impl Filter {
    /// Short name for logs
    pub fn name(self) -> &'static str {
        match self {
            Filter::RouteMatch => "route",
            Filter::FilenameMatch => "filename",
            Filter::OpenFiles => "open-files",
            Filter::MediaMatch => "media",
        }
    }
}

/// Inputs shared by all filters for one event
pub struct ReduceContext<'a> {
    pub route: Option<&'a RouteResolution>,
    pub open_files: &'a [FileId],
    pub filename_hint: Option<&'a str>,
    pub change: &'a RuleChange,
    pub resolver: &'a dyn StyleResolver,
    pub options: ResolveOptions,
}

/// Ordered set of enabled filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceStrategy {
    filters: Vec<Filter>,
}

impl ReduceStrategy {
    /// Create a strategy from an explicit filter list
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    /// Enable filters according to settings, in canonical order
    pub fn from_settings(settings: &Settings) -> Self {
        let mut filters = Vec::with_capacity(4);
        if settings.use_routes {
            filters.push(Filter::RouteMatch);
        }
        if settings.file_reduce {
            filters.push(Filter::FilenameMatch);
        }
        if settings.current_documents_reduce {
            filters.push(Filter::OpenFiles);
        }
        if settings.media_reduce {
            filters.push(Filter::MediaMatch);
        }
        Self { filters }
    }

    /// Enabled filters in application order
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Narrow `candidates` by each filter in turn
    pub fn reduce(&self, ctx: &ReduceContext<'_>, candidates: Vec<FileId>) -> Vec<FileId> {
        let mut current = candidates;
        for filter in &self.filters {
            if current.len() <= 1 {
                break;
            }
            let narrowed = apply_filter(*filter, ctx, &current);
            if narrowed.is_empty() {
                trace!("Filter {} matched nothing, skipping", filter.name());
                continue;
            }
            debug!(
                "Filter {} kept {} of {} candidates",
                filter.name(),
                narrowed.len(),
                current.len()
            );
            current = narrowed;
        }
        current
    }
}

fn apply_filter(filter: Filter, ctx: &ReduceContext<'_>, files: &[FileId]) -> Vec<FileId> {
    match filter {
        Filter::RouteMatch => {
            let Some(route) = ctx.route else {
                return Vec::new();
            };
            let target = route.local_path();
            files
                .iter()
                .filter(|f| f.path() == target.as_path())
                .cloned()
                .collect()
        }
        Filter::FilenameMatch => {
            let Some(hint) = ctx.filename_hint else {
                return Vec::new();
            };
            files
                .iter()
                .filter(|f| f.file_name() == Some(hint))
                .cloned()
                .collect()
        }
        Filter::OpenFiles => files
            .iter()
            .filter(|f| ctx.open_files.contains(f))
            .cloned()
            .collect(),
        Filter::MediaMatch => {
            let Some(media) = ctx.change.media.as_deref() else {
                return files.to_vec();
            };
            files
                .iter()
                .filter(|file| declares_under_media(ctx, file, media))
                .cloned()
                .collect()
        }
    }
}

fn declares_under_media(ctx: &ReduceContext<'_>, file: &FileId, media: &str) -> bool {
    match ctx
        .resolver
        .find_declarations(file, &ctx.change.selector, &ctx.change.property, ctx.options)
    {
        Ok(found) => found.iter().any(|d| same_media(d.media(), Some(media))),
        Err(e) => {
            debug!("Media filter could not read {}: {}", file, e);
            false
        }
    }
}

/// Compare media conditions regardless of whitespace formatting
pub(crate) fn same_media(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => normalize_whitespace(a) == normalize_whitespace(b),
        (None, None) => true,
        _ => false,
    }
}
