//! Template helpers.
//!
//! These are the text filters templates use to turn entry fields into
//! output. They are registered on every [`TemplateRenderer`](crate::template::TemplateRenderer).
//!
//! | Helper | Usage | Output |
//! |--------|-------|--------|
//! | `markdown` | `{{{markdown Text}}}` | Entry text as HTML |
//! | `format` | `{{format Date "%Y-%m-%d"}}` | strftime-formatted date |
//! | `escape_tex` | `{{escape_tex Text}}` | Text with LaTeX specials escaped |
//! | `imgbase64` | `{{imgbase64 Photo}}` | Base64 of the photo file |
//! | `place` | `{{place this 2 ignore="France"}}` | Comma-separated location |
//! | `weather` | `{{{weather this "C"}}}` | `21&deg; Sunny` |
//!
//! Helpers return values rather than writing to the output directly, so the
//! usual handlebars escaping rules apply: `{{…}}` escapes for HTML
//! templates, `{{{…}}}` never escapes.

use crate::entry::{InvalidArgument, PlaceLevels, format_place, format_weather, temperature_key};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderError, RenderErrorReason, ScopedJson,
    handlebars_helper,
};
use pulldown_cmark::{Event, Options, Parser, html as md_html};
use serde_json::Value as Json;
use std::borrow::Cow;
use std::fmt::Write;
use std::fs;
use std::path::PathBuf;

/// Default pattern of the `format` helper, e.g. `Friday, Jan  3, 2014`.
pub const DEFAULT_DATE_FORMAT: &str = "%A, %b %e, %Y";

/// Options consumed by the helpers.
#[derive(Debug, Clone, Default)]
pub struct HelperSettings {
    /// Turn the first line of each entry into a heading.
    pub autobold: bool,
    /// Turn single newlines into `<br />`.
    pub nl2br: bool,
    /// Journal folder photo paths are relative to.
    pub journal_folder: PathBuf,
}

pub fn register_helpers(registry: &mut Handlebars<'_>, settings: &HelperSettings) {
    registry.register_helper(
        "markdown",
        Box::new(MarkdownHelper {
            autobold: settings.autobold,
            nl2br: settings.nl2br,
        }),
    );
    registry.register_helper("format", Box::new(FormatHelper));
    registry.register_helper("escape_tex", Box::new(escape_tex_helper));
    registry.register_helper(
        "imgbase64",
        Box::new(ImageHelper {
            journal_folder: settings.journal_folder.clone(),
        }),
    );
    registry.register_helper("place", Box::new(PlaceHelper));
    registry.register_helper("weather", Box::new(WeatherHelper));
}

// ============================================================================
// Pure text transforms
// ============================================================================

/// Render markdown to HTML.
pub fn render_markdown(text: &str, autobold: bool, nl2br: bool) -> String {
    let source = if autobold {
        autobold_first_line(text)
    } else {
        Cow::Borrowed(text)
    };
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(&source, options).map(|event| match event {
        Event::SoftBreak if nl2br => Event::HardBreak,
        other => other,
    });
    let mut html = String::new();
    md_html::push_html(&mut html, parser);
    html
}

/// Prefix the first line with `# ` unless it is blank or already a heading.
fn autobold_first_line(text: &str) -> Cow<'_, str> {
    let first = text.lines().next().unwrap_or_default().trim();
    if first.is_empty() || first.starts_with('#') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("# {}", text.trim_start()))
    }
}

/// Escape characters with special meaning in LaTeX.
pub fn escape_tex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str(r"\textasciitilde{}"),
            '^' => out.push_str(r"\textasciicircum{}"),
            '\\' => out.push_str(r"\textbackslash{}"),
            _ => out.push(c),
        }
    }
    out
}

/// Format a serialized date (RFC 3339, or naive `YYYY-MM-DDTHH:MM:SS`).
pub fn format_date(value: &str, pattern: &str) -> Result<String, InvalidArgument> {
    let bad_pattern = || InvalidArgument(format!("invalid date format '{pattern}'"));
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(bad_pattern());
    }
    let mut out = String::new();
    let written = if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        write!(out, "{}", date.format(pattern))
    } else {
        let date = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
            .map_err(|_| InvalidArgument(format!("'{value}' is not a date")))?;
        write!(out, "{}", date.format(pattern))
    };
    written.map_err(|_| bad_pattern())?;
    Ok(out)
}

/// Interpret the `levels` argument of `place`: a count or a list of levels.
pub fn place_levels_from_json(value: &Json) -> Result<PlaceLevels, InvalidArgument> {
    let wrong_shape = || InvalidArgument("'levels' argument must be an integer or list".into());
    match value {
        Json::Number(n) => n
            .as_u64()
            .map(|n| PlaceLevels::Count(n as usize))
            .ok_or_else(wrong_shape),
        Json::Array(items) => items
            .iter()
            .map(|item| item.as_u64().map(|n| n as usize).ok_or_else(wrong_shape))
            .collect::<Result<_, _>>()
            .map(PlaceLevels::Levels),
        _ => Err(wrong_shape()),
    }
}

/// Interpret the `ignore` argument of `place`: one name or a list of names.
pub fn ignore_list_from_json(value: Option<&Json>) -> Result<Vec<String>, InvalidArgument> {
    let wrong_shape = || InvalidArgument("'ignore' argument must be a string or list".into());
    match value {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::String(s)) => Ok(vec![s.clone()]),
        Some(Json::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(String::from).ok_or_else(wrong_shape))
            .collect(),
        Some(_) => Err(wrong_shape()),
    }
}

fn json_text(value: Option<&Json>) -> String {
    match value {
        None | Some(Json::Null) => String::new(),
        Some(Json::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn invalid(err: InvalidArgument) -> RenderError {
    RenderErrorReason::Other(err.to_string()).into()
}

fn derived<'rc>(text: String) -> Result<ScopedJson<'rc>, RenderError> {
    Ok(ScopedJson::Derived(Json::String(text)))
}

// ============================================================================
// Helper definitions
// ============================================================================

handlebars_helper!(escape_tex_helper: |text: str| escape_tex(text));

struct MarkdownHelper {
    autobold: bool,
    nl2br: bool,
}

impl HelperDef for MarkdownHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let text = json_text(h.param(0).map(|p| p.value()));
        derived(render_markdown(&text, self.autobold, self.nl2br))
    }
}

struct FormatHelper;

impl HelperDef for FormatHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let value = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("format", 0))?
            .value()
            .as_str()
            .ok_or(RenderErrorReason::InvalidParamType("string"))?;
        let pattern = match h.param(1).map(|p| p.value()) {
            None => DEFAULT_DATE_FORMAT,
            Some(Json::String(s)) => s.as_str(),
            Some(_) => return Err(RenderErrorReason::InvalidParamType("string").into()),
        };
        derived(format_date(value, pattern).map_err(invalid)?)
    }
}

struct ImageHelper {
    journal_folder: PathBuf,
}

impl HelperDef for ImageHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let relative = json_text(h.param(0).map(|p| p.value()));
        if relative.is_empty() {
            return derived(String::new());
        }
        let path = self.journal_folder.join(&relative);
        let bytes = fs::read(&path).map_err(|e| {
            RenderErrorReason::Other(format!("Unable to read photo {}: {e}", path.display()))
        })?;
        derived(BASE64.encode(bytes))
    }
}

struct PlaceHelper;

impl HelperDef for PlaceHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let entry = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("place", 0))?
            .value()
            .as_object()
            .ok_or(RenderErrorReason::InvalidParamType("object"))?;
        let levels = match h.param(1) {
            Some(levels) => place_levels_from_json(levels.value()).map_err(invalid)?,
            None => PlaceLevels::default(),
        };
        let ignore = ignore_list_from_json(h.hash_get("ignore").map(|p| p.value()))
            .map_err(invalid)?;
        let ignore: Vec<&str> = ignore.iter().map(String::as_str).collect();

        let place = format_place(
            entry.contains_key(crate::entry::LOCATION),
            |key| entry.get(key).and_then(Json::as_str),
            &levels,
            &ignore,
        )
        .map_err(invalid)?;
        derived(place)
    }
}

struct WeatherHelper;

impl HelperDef for WeatherHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut handlebars::RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let entry = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("weather", 0))?
            .value()
            .as_object()
            .ok_or(RenderErrorReason::InvalidParamType("object"))?;
        let unit = h
            .param(1)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("weather", 1))?
            .value()
            .as_str()
            .ok_or(RenderErrorReason::InvalidParamType("string"))?;
        if !entry.contains_key(crate::entry::WEATHER) {
            return derived(String::new());
        }
        let temperature = json_text(entry.get(temperature_key(unit)));
        let description = json_text(entry.get("Description"));
        derived(format_weather(&temperature, &description))
    }
}
