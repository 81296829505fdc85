//! # Day One Export
//!
//! Export [Day One](https://dayoneapp.com) journal entries through a
//! template. A journal folder holds one property list per entry plus an
//! optional folder of photos; the exporter turns those into a chronological,
//! time-zoned list of entries, filters it, and renders it into one or more
//! documents.
//!
//! # Pipeline
//!
//! ```text
//! 1. Normalize   entries/*.doentry  →  ParsedEntry    (flatten, rename, validate)
//! 2. Assemble    ParsedEntry…       →  Vec<Entry>     (photos, sort, time zones)
//! 3. Select      Vec<Entry>         →  Vec<Entry>     (dates, tags, direction)
//! 4. Group       Vec<Entry>         →  Groups<R>      (key, rendered text), lazily
//! ```
//!
//! Steps 1 to 3 read everything eagerly; only rendering is deferred. A
//! caller stops the export by dropping the [`group::Groups`] iterator.
//!
//! ```no_run
//! use dayone_export::{ExportConfig, dayone_export};
//! use std::path::Path;
//!
//! let config = ExportConfig {
//!     filename_template: "%Y.html".into(),
//!     ..Default::default()
//! };
//! for group in dayone_export(Path::new("Journal.dayone"), &config)? {
//!     let (file_name, html) = group?;
//!     std::fs::write(file_name, html)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`entry`] | Parses one `.doentry` file into a [`entry::ParsedEntry`]; the enriched [`entry::Entry`] model |
//! | [`journal`] | Assembles a folder: photo correlation, stable ordering, time zone back-fill |
//! | [`filter`] | Date bounds and tag filters |
//! | [`group`] | Grouping by formatted date and the [`group::Render`] seam |
//! | [`template`] | Template discovery and the Handlebars renderer |
//! | [`helpers`] | Template helpers: `markdown`, `format`, `escape_tex`, `imgbase64`, `place`, `weather` |
//! | [`config`] | `config.toml` loading, merging, and validation |
//! | [`export`] | The public entry points tying it all together |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Two-Phase Entries
//!
//! Normalization produces a [`entry::ParsedEntry`] that knows nothing about
//! photos or time zones. Assembly consumes it and builds an
//! [`entry::Entry`] with the photo path, zone name and local date fixed at
//! once, so no half-initialized entry is ever visible.
//!
//! ## Tolerating Damaged Journals
//!
//! An entry without a creation date is dropped and the export continues.
//! Every other problem (unreadable file, corrupt property list, missing
//! UUID) stops the export with the path of the offending file.
//!
//! ## Time Zone Back-Fill
//!
//! Older Day One versions did not record a time zone. Walking from the
//! newest entry to the oldest, each entry without one inherits the nearest
//! later declaration, so a journal needs only occasional zone records to be
//! localized throughout. Unknown zone names fall back to UTC.
//!
//! ## Renderer Errors Pass Through
//!
//! [`group::Groups`] yields the renderer's own error type untouched. A
//! template error carries its own line and column; wrapping it would only
//! bury that.

pub mod config;
pub mod entry;
pub mod export;
pub mod filter;
pub mod group;
pub mod helpers;
pub mod journal;
pub mod output;
pub mod template;

pub use config::ExportConfig;
pub use export::{ExportError, dayone_export, export_with};

#[cfg(test)]
pub(crate) mod test_helpers;
