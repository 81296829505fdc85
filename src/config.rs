//! Export configuration.
//!
//! Handles loading, validating, and merging `config.toml` files. Options are
//! layered: stock defaults, then a config file, then command-line flags.
//! Each layer only needs the keys it wants to override.
//!
//! ## Config File Location
//!
//! An explicit `--config <file>` wins. Otherwise `config.toml` is read from
//! the template search directory when it exists:
//!
//! ```text
//! ~/.dayone_export/
//! ├── config.toml          # Export options (optional)
//! ├── default.html         # Overrides the built-in HTML template
//! └── letter.tex           # Any other template
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! template = "letter.tex"       # Template file name or path
//! template_dir = "~/templates"  # Only look for templates here
//! format = "html"               # Picks default.<format> when no template is set
//! reverse = false               # Newest entries first
//! tags = "any"                  # "any", or a list: ["work", "travel"]
//! exclude = ["private"]         # Drop entries with any of these tags
//! after = "2014-01-01"          # Inclusive lower bound
//! before = "2015-01-01 12:00"   # Exclusive upper bound
//! autobold = false              # First line of each entry becomes a heading
//! nl2br = false                 # Single newlines become <br />
//! filename_template = ""        # strftime pattern splitting output into files
//! ```
//!
//! Unknown keys are rejected.

use crate::filter::{DateBound, TagFilter};
use crate::group::FilenamePattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Every option recognized by [`dayone_export`](crate::export::dayone_export).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Template file. A path with a directory component is loaded from
    /// exactly there; a bare name is searched for.
    pub template: Option<PathBuf>,
    /// Restrict the template search to this directory.
    pub template_dir: Option<PathBuf>,
    /// Output format hint; selects `default.<format>` when no template is set.
    pub format: Option<String>,
    /// Output newest entries first.
    pub reverse: bool,
    /// Keep only tagged entries (see [`TagFilter`]).
    pub tags: Option<TagFilter>,
    /// Drop entries with any of these tags.
    pub exclude: Option<BTreeSet<String>>,
    /// Keep entries created at or after this instant.
    pub after: Option<DateBound>,
    /// Keep entries created strictly before this instant.
    pub before: Option<DateBound>,
    pub autobold: bool,
    pub nl2br: bool,
    /// strftime pattern applied to each entry's local date; entries with the
    /// same result are rendered into the same document.
    pub filename_template: String,
}

impl ExportConfig {
    /// Reject options that cannot be used at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.format.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(ConfigError::Validation("format must not be empty".into()));
        }
        if let Err(e) = FilenamePattern::new(&self.filename_template) {
            return Err(ConfigError::Validation(e.to_string()));
        }
        Ok(())
    }

    /// The validated grouping pattern.
    pub fn filename_pattern(&self) -> Result<FilenamePattern, ConfigError> {
        FilenamePattern::new(&self.filename_template)
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ExportConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no `config.toml`.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    read_toml(&config_path).map(Some)
}

/// Load an explicitly named config file. A missing file is an error.
pub fn load_config_file(path: &Path) -> Result<toml::Value, ConfigError> {
    read_toml(path)
}

fn read_toml(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge the overlays onto `base` in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<ExportConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: ExportConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Day One Export Configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# This file is read from --config <file>, or from config.toml in the
# template directory (--template-dir, or ~/.dayone_export).
# Command-line flags override anything set here.
# Unknown keys will cause an error.

# Template file. A path such as "templates/letter.tex" loads exactly that
# file; a bare name is looked up in the current directory, then
# ~/.dayone_export, then the built-in templates.
# template = "default.html"

# Only look for templates in this directory.
# template_dir = "/path/to/templates"

# Output format. Without a template, "default.<format>" is used
# (built in: html, md).
# format = "html"

# Output newest entries first.
reverse = false

# Keep only tagged entries: "any" for entries with at least one tag,
# or a list of tags to match.
# tags = "any"
# tags = ["work", "travel"]

# Drop entries carrying any of these tags.
# exclude = ["private"]

# Date range. Accepts YYYY-MM-DD, YYYY-MM-DD HH:MM[:SS], or RFC 3339 with
# an offset. Dates without an offset are read in the time zone of the
# newest entry. "after" is inclusive, "before" is exclusive.
# after = "2014-01-01"
# before = "2015-01-01"

# Markdown rendering.
autobold = false   # First line of each entry becomes a heading
nl2br = false      # Single newlines become line breaks

# Split output into several files. strftime codes are filled in from each
# entry's local date, e.g. "journal-%Y-%m.html" writes one file per month.
# Empty means a single document.
filename_template = ""
"##
}
