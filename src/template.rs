//! Template discovery and rendering.
//!
//! Templates are Handlebars documents rendered once per output group with
//! the context `{ journal: [entry, …], today: "YYYY-MM-DDTHH:MM:SS" }`.
//!
//! ## Search order
//!
//! | Options | Searched |
//! |---------|----------|
//! | `template = "dir/name.ext"` | `dir/` only |
//! | `template_dir = "dir"` | `dir/` only |
//! | `template = "name.ext"` | `.`, `~/.dayone_export`, built-ins |
//! | neither | `~/.dayone_export`, built-ins |
//!
//! Without a template name, `default.<format>` is used (`default.html`
//! when no format is given). `default.html` and `default.md` are built in.
//!
//! Output of `{{…}}` is HTML-escaped for `.html`/`.htm` templates and left
//! as is for every other extension. `{{{…}}}` never escapes.

use crate::config::ExportConfig;
use crate::group::{Render, RenderContext};
use crate::helpers::{HelperSettings, register_helpers};
use handlebars::{Handlebars, RenderError};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Per-user template directory, relative to the home directory.
pub const USER_TEMPLATE_DIR: &str = ".dayone_export";
pub const DEFAULT_TEMPLATE_STEM: &str = "default";
pub const DEFAULT_FORMAT: &str = "html";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("default.html", include_str!("../templates/default.html")),
    ("default.md", include_str!("../templates/default.md")),
];

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template '{name}' not found (searched: {})", searched.join(", "))]
    NotFound { name: String, searched: Vec<String> },
    #[error("Unable to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Template '{name}' is invalid: {source}")]
    Syntax {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
}

// ============================================================================
// Discovery
// ============================================================================

/// One place a template may come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Directory(PathBuf),
    BuiltIn,
}

impl fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateSource::Directory(dir) => write!(f, "{}", dir.display()),
            TemplateSource::BuiltIn => write!(f, "<built-in>"),
        }
    }
}

/// Where to look for a template and under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLookup {
    pub search_path: Vec<TemplateSource>,
    pub name: String,
}

/// Work out the template search path from the user's options.
///
/// `user_dir` is the per-user template directory, passed in so discovery
/// never reads the environment itself (see [`default_template_dir`]).
pub fn determine_inheritance(
    template: Option<&Path>,
    template_dir: Option<&Path>,
    format: Option<&str>,
    user_dir: Option<&Path>,
) -> TemplateLookup {
    if let Some(template) = template {
        if let (Some(parent), Some(name)) = (template.parent(), template.file_name()) {
            if !parent.as_os_str().is_empty() {
                return TemplateLookup {
                    search_path: vec![TemplateSource::Directory(parent.to_path_buf())],
                    name: name.to_string_lossy().into_owned(),
                };
            }
        }
    }

    let search_path = match template_dir {
        Some(dir) => vec![TemplateSource::Directory(dir.to_path_buf())],
        None => {
            let mut path = Vec::new();
            if template.is_some() {
                path.push(TemplateSource::Directory(PathBuf::from(".")));
            }
            if let Some(dir) = user_dir {
                path.push(TemplateSource::Directory(dir.to_path_buf()));
            }
            path.push(TemplateSource::BuiltIn);
            path
        }
    };

    let name = match template {
        Some(t) => t.to_string_lossy().into_owned(),
        None => format!(
            "{DEFAULT_TEMPLATE_STEM}.{}",
            format.unwrap_or(DEFAULT_FORMAT)
        ),
    };

    TemplateLookup { search_path, name }
}

/// `~/.dayone_export`, if a home directory is known.
pub fn default_template_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_TEMPLATE_DIR))
}

/// The built-in template called `name`, if there is one.
pub fn builtin_template(name: &str) -> Option<&'static str> {
    BUILTIN_TEMPLATES
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, source)| *source)
}

impl TemplateLookup {
    /// Read the first template found along the search path.
    pub fn load(&self) -> Result<String, TemplateError> {
        for source in &self.search_path {
            match source {
                TemplateSource::Directory(dir) => {
                    let path = dir.join(&self.name);
                    if !path.is_file() {
                        continue;
                    }
                    debug!(template = %path.display(), "using template");
                    return fs::read_to_string(&path)
                        .map_err(|source| TemplateError::Io { path, source });
                }
                TemplateSource::BuiltIn => {
                    if let Some(text) = builtin_template(&self.name) {
                        debug!(template = %self.name, "using built-in template");
                        return Ok(text.to_string());
                    }
                }
            }
        }
        Err(TemplateError::NotFound {
            name: self.name.clone(),
            searched: self.search_path.iter().map(ToString::to_string).collect(),
        })
    }
}

/// True when interpolations in this template should be HTML-escaped.
pub fn escapes_html(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

// ============================================================================
// Rendering
// ============================================================================

/// A compiled template with all helpers registered.
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
    name: String,
}

impl TemplateRenderer {
    /// Find, load and compile the template selected by `config`.
    pub fn from_config(journal_folder: &Path, config: &ExportConfig) -> Result<Self, TemplateError> {
        let user_dir = default_template_dir();
        let lookup = determine_inheritance(
            config.template.as_deref(),
            config.template_dir.as_deref(),
            config.format.as_deref(),
            user_dir.as_deref(),
        );
        let source = lookup.load()?;
        let settings = HelperSettings {
            autobold: config.autobold,
            nl2br: config.nl2br,
            journal_folder: journal_folder.to_path_buf(),
        };
        Self::from_source(&lookup.name, &source, &settings)
    }

    /// Compile `source`; `name` decides the escaping rules.
    pub fn from_source(
        name: &str,
        source: &str,
        settings: &HelperSettings,
    ) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        if !escapes_html(name) {
            registry.register_escape_fn(handlebars::no_escape);
        }
        register_helpers(&mut registry, settings);
        registry
            .register_template_string(name, source)
            .map_err(|e| TemplateError::Syntax {
                name: name.to_string(),
                source: Box::new(e),
            })?;
        Ok(Self {
            registry,
            name: name.to_string(),
        })
    }
}

impl Render for TemplateRenderer {
    type Error = RenderError;

    fn render(&self, context: &RenderContext<'_>) -> Result<String, RenderError> {
        self.registry.render(&self.name, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, normalize};
    use crate::journal::resolve_time_zone;
    use crate::test_helpers::*;
    use chrono::NaiveDate;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn dirs_of(lookup: &TemplateLookup) -> Vec<String> {
        lookup.search_path.iter().map(ToString::to_string).collect()
    }

    // =========================================================================
    // determine_inheritance
    // =========================================================================

    #[test]
    fn explicit_path_searches_only_its_directory() {
        let lookup = determine_inheritance(
            Some(Path::new("tpl/letter.tex")),
            Some(Path::new("ignored")),
            Some("md"),
            Some(Path::new("/home/u/.dayone_export")),
        );
        assert_eq!(lookup.name, "letter.tex");
        assert_eq!(
            lookup.search_path,
            vec![TemplateSource::Directory(PathBuf::from("tpl"))]
        );
    }

    #[test]
    fn template_dir_searched_alone() {
        let lookup = determine_inheritance(None, Some(Path::new("mine")), Some("md"), None);
        assert_eq!(lookup.name, "default.md");
        assert_eq!(dirs_of(&lookup), vec!["mine"]);
    }

    #[test]
    fn bare_name_searches_cwd_first() {
        let lookup = determine_inheritance(
            Some(Path::new("letter.tex")),
            None,
            None,
            Some(Path::new("/home/u/.dayone_export")),
        );
        assert_eq!(lookup.name, "letter.tex");
        assert_eq!(
            dirs_of(&lookup),
            vec![".", "/home/u/.dayone_export", "<built-in>"]
        );
    }

    #[test]
    fn no_template_skips_cwd() {
        let lookup =
            determine_inheritance(None, None, None, Some(Path::new("/home/u/.dayone_export")));
        assert_eq!(lookup.name, "default.html");
        assert_eq!(dirs_of(&lookup), vec!["/home/u/.dayone_export", "<built-in>"]);
    }

    #[test]
    fn no_home_directory() {
        let lookup = determine_inheritance(None, None, Some("md"), None);
        assert_eq!(lookup.search_path, vec![TemplateSource::BuiltIn]);
        assert_eq!(lookup.name, "default.md");
    }

    // =========================================================================
    // loading
    // =========================================================================

    #[test]
    fn user_directory_overrides_builtin() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("default.html"), "mine").unwrap();
        let lookup = determine_inheritance(None, None, None, Some(tmp.path()));
        assert_eq!(lookup.load().unwrap(), "mine");
    }

    #[test]
    fn falls_back_to_builtin() {
        let tmp = TempDir::new().unwrap();
        let lookup = determine_inheritance(None, None, Some("md"), Some(tmp.path()));
        assert_eq!(lookup.load().unwrap(), builtin_template("default.md").unwrap());
    }

    #[test]
    fn missing_template_lists_search_path() {
        let tmp = TempDir::new().unwrap();
        let lookup = determine_inheritance(None, Some(tmp.path()), Some("tex"), None);
        let err = lookup.load().unwrap_err();
        match &err {
            TemplateError::NotFound { name, searched } => {
                assert_eq!(name, "default.tex");
                assert_eq!(searched.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("default.tex"));
    }

    #[test]
    fn template_dir_does_not_fall_back_to_builtin() {
        let tmp = TempDir::new().unwrap();
        let lookup = determine_inheritance(None, Some(tmp.path()), None, None);
        assert!(matches!(lookup.load(), Err(TemplateError::NotFound { .. })));
    }

    #[test]
    fn escaping_follows_extension() {
        assert!(escapes_html("default.html"));
        assert!(escapes_html("page.HTM"));
        assert!(!escapes_html("default.md"));
        assert!(!escapes_html("letter.tex"));
        assert!(!escapes_html("noext"));
    }

    // =========================================================================
    // rendering
    // =========================================================================

    fn entry(uuid: &str, date: &str, extra: &str) -> Entry {
        let xml = doentry(uuid, date, extra);
        let value = plist::Value::from_reader(Cursor::new(xml.into_bytes())).unwrap();
        let parsed = normalize(value, Path::new("test.doentry")).unwrap();
        Entry::enrich(parsed, "UTC", resolve_time_zone("UTC"), None)
    }

    fn render(name: &str, source: &str, entries: &[Entry]) -> Result<String, RenderError> {
        let renderer = TemplateRenderer::from_source(name, source, &HelperSettings::default())
            .unwrap();
        let today = NaiveDate::from_ymd_opt(2020, 5, 17)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        renderer.render(&RenderContext {
            journal: entries,
            today,
        })
    }

    #[test]
    fn html_templates_escape() {
        let entries = [entry("A", "2014-01-01T00:00:00Z", "<key>Entry Text</key><string>a &lt; b</string>")];
        let out = render("t.html", "{{#each journal}}{{Text}}{{/each}}", &entries).unwrap();
        assert_eq!(out, "a &lt; b");
    }

    #[test]
    fn other_templates_render_raw() {
        let entries = [entry("A", "2014-01-01T00:00:00Z", "<key>Entry Text</key><string>a &lt; b</string>")];
        let out = render("t.md", "{{#each journal}}{{Text}}{{/each}}", &entries).unwrap();
        assert_eq!(out, "a < b");
    }

    #[test]
    fn context_exposes_today_and_dates() {
        let entries = [entry("A", "2014-01-01T08:00:00Z", "")];
        let out = render(
            "t.txt",
            r#"{{format today "%Y"}}|{{#each journal}}{{format Date "%H:%M"}} {{UUID}}{{/each}}"#,
            &entries,
        )
        .unwrap();
        assert_eq!(out, "2020|08:00 A");
    }

    #[test]
    fn syntax_error_reported_at_compile_time() {
        let err = TemplateRenderer::from_source("t.md", "{{#each journal}}", &HelperSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }

    #[test]
    fn render_error_passes_through() {
        let entries = [entry("A", "2014-01-01T00:00:00Z", "")];
        assert!(render("t.md", r#"{{format today "%Q"}}"#, &entries).is_err());
    }

    #[test]
    fn builtin_templates_compile_and_render() {
        let entries = [entry(
            "A",
            "2014-01-01T08:00:00Z",
            "<key>Entry Text</key><string>Hello world</string>\
             <key>Tags</key><array><string>work</string></array>",
        )];
        for (name, source) in BUILTIN_TEMPLATES {
            let out = render(name, source, &entries).unwrap();
            assert!(out.contains("Hello world"), "{name} lost the text");
            assert!(out.contains("work"), "{name} lost the tags");
        }
    }
}
