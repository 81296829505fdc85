//! Splitting the selected entries into output documents.
//!
//! Each entry's localized date is formatted with a strftime pattern; entries
//! sharing the resulting string form one group and are rendered together.
//! With the default empty pattern every entry maps to `""`, so the whole
//! selection becomes a single document.
//!
//! Groups come out in the order their key was first seen, and each group
//! keeps the relative order of its entries. Rendering happens lazily, one
//! group per call to [`Iterator::next`]; dropping the iterator early skips
//! the remaining groups.

use crate::entry::Entry;
use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use std::iter::FusedIterator;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("Invalid filename pattern '{0}': not a valid strftime format")]
    InvalidPattern(String),
}

/// Everything a template sees for one output document.
#[derive(Debug, Serialize)]
pub struct RenderContext<'a> {
    /// Entries of this group, in output order.
    pub journal: &'a [Entry],
    /// When the export started; identical for every group of one run.
    #[serde(serialize_with = "serialize_today")]
    pub today: NaiveDateTime,
}

fn serialize_today<S: serde::Serializer>(today: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&today.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Turns one group of entries into text.
///
/// Errors are handed to the caller exactly as the renderer produced them.
pub trait Render {
    type Error;

    fn render(&self, context: &RenderContext<'_>) -> Result<String, Self::Error>;
}

// ============================================================================
// Grouping keys
// ============================================================================

/// A validated strftime pattern used to derive group keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilenamePattern {
    pattern: String,
}

impl FilenamePattern {
    /// Check `pattern` up front by formatting a sample date. Whether a
    /// pattern formats depends only on its specifiers, so keys built from
    /// an accepted pattern always format.
    pub fn new(pattern: &str) -> Result<Self, GroupError> {
        if !formats_cleanly(pattern) {
            return Err(GroupError::InvalidPattern(pattern.to_string()));
        }
        Ok(Self {
            pattern: pattern.to_string(),
        })
    }

    pub fn key_for(&self, date: &DateTime<Tz>) -> String {
        date.format(&self.pattern).to_string()
    }
}

/// True when `pattern` both parses and formats. Parse-only specifiers
/// such as `%#z` parse fine but fail when formatting.
pub fn formats_cleanly(pattern: &str) -> bool {
    Tz::UTC
        .timestamp_opt(0, 0)
        .single()
        .is_some_and(|sample| write!(String::new(), "{}", sample.format(pattern)).is_ok())
}

/// Bucket entries by key, keeping first-seen key order.
pub fn group_entries(entries: Vec<Entry>, pattern: &FilenamePattern) -> Vec<(String, Vec<Entry>)> {
    let mut groups: Vec<(String, Vec<Entry>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        let key = pattern.key_for(entry.date());
        match index.get(&key) {
            Some(&i) => groups[i].1.push(entry),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![entry]));
            }
        }
    }
    groups
}

/// Group `entries` and prepare them for lazy rendering.
pub fn group<R: Render>(
    entries: Vec<Entry>,
    pattern: &FilenamePattern,
    renderer: R,
    today: NaiveDateTime,
) -> Groups<R> {
    Groups {
        groups: group_entries(entries, pattern).into_iter(),
        renderer,
        today,
    }
}

/// Single-pass sequence of `(key, rendered text)` pairs.
pub struct Groups<R> {
    groups: std::vec::IntoIter<(String, Vec<Entry>)>,
    renderer: R,
    today: NaiveDateTime,
}

impl<R> Groups<R> {
    /// Groups not yet rendered.
    pub fn remaining(&self) -> usize {
        self.groups.len()
    }
}

impl<R: Render> Iterator for Groups<R> {
    type Item = Result<(String, String), R::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, journal) = self.groups.next()?;
        let context = RenderContext {
            journal: &journal,
            today: self.today,
        };
        Some(self.renderer.render(&context).map(|text| (key, text)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.groups.size_hint()
    }
}

impl<R: Render> ExactSizeIterator for Groups<R> {}

impl<R: Render> FusedIterator for Groups<R> {}
