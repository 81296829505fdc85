//! The export pipeline.
//!
//! ```text
//! folder ──▶ parse_journal ──▶ select ──▶ group ──▶ (key, text), …
//!                              │
//!                              ├─ date bounds (after ≤ t < before)
//!                              ├─ tags / exclude
//!                              └─ reverse
//! ```
//!
//! The template is located and compiled before the journal is read, so a
//! bad template is reported without touching the entries. Rendering is
//! lazy: nothing is rendered until the returned [`Groups`] is iterated.

use crate::config::{ConfigError, ExportConfig};
use crate::entry::Entry;
use crate::filter::{default_time_zone, exclude_tags, filter_by_date, filter_by_tag};
use crate::group::{Groups, Render, group};
use crate::journal::{JournalError, parse_journal};
use crate::template::{TemplateError, TemplateRenderer};
use chrono::Local;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Export the journal in `folder` through the template `config` selects.
///
/// Yields one `(key, rendered text)` pair per output group. The key is the
/// entry date formatted with `filename_template` (empty by default, giving a
/// single group). Template errors come out of the iterator unchanged.
pub fn dayone_export(
    folder: &Path,
    config: &ExportConfig,
) -> Result<Groups<TemplateRenderer>, ExportError> {
    let renderer = TemplateRenderer::from_config(folder, config)?;
    export_with(folder, config, renderer)
}

/// Like [`dayone_export`] with a caller-supplied renderer.
pub fn export_with<R: Render>(
    folder: &Path,
    config: &ExportConfig,
    renderer: R,
) -> Result<Groups<R>, ExportError> {
    let pattern = config.filename_pattern()?;
    let journal = parse_journal(folder)?;
    let selected = select(journal, config);
    debug!(entries = selected.len(), "entries selected for export");
    let today = Local::now().naive_local();
    Ok(group(selected, &pattern, renderer, today))
}

/// Apply the date, tag and ordering options to an assembled journal.
pub fn select(journal: Vec<Entry>, config: &ExportConfig) -> Vec<Entry> {
    let default_tz = default_time_zone(&journal);
    let after = config.after.map(|b| b.to_utc_naive(default_tz));
    let before = config.before.map(|b| b.to_utc_naive(default_tz));

    let mut journal = filter_by_date(journal, after, before);
    if let Some(tags) = &config.tags {
        journal = filter_by_tag(journal, tags);
    }
    if let Some(exclude) = &config.exclude {
        journal = exclude_tags(journal, exclude);
    }
    if config.reverse {
        journal.reverse();
    }
    journal
}
