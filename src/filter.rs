//! Date and tag filtering over an assembled journal.
//!
//! All filters are pure: they take an ordered entry sequence and return the
//! entries that pass, in the same order.
//!
//! ## Date bounds
//!
//! Entry creation dates are naive UTC timestamps, so bounds are brought to
//! the same form before comparing. A bound that carries an offset is simply
//! converted to UTC. A naive bound is read as wall-clock time in the
//! journal's default zone (the zone of the newest entry) and then converted.
//! `after` is inclusive and `before` is exclusive.

use crate::entry::Entry;
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Unrecognized date '{0}' (expected YYYY-MM-DD, YYYY-MM-DD HH:MM[:SS] or RFC 3339)")]
    InvalidDate(String),
}

// ============================================================================
// Date bounds
// ============================================================================

/// A date filter bound as supplied by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateBound {
    /// Wall-clock time with no zone attached.
    Naive(NaiveDateTime),
    /// A fixed instant.
    Aware(DateTime<FixedOffset>),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl FromStr for DateBound {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(aware) = DateTime::parse_from_rfc3339(s) {
            return Ok(DateBound::Aware(aware));
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(DateBound::Naive(naive));
            }
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(DateBound::Naive)
            .ok_or_else(|| FilterError::InvalidDate(s.to_string()))
    }
}

impl TryFrom<String> for DateBound {
    type Error = FilterError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DateBound> for String {
    fn from(bound: DateBound) -> String {
        bound.to_string()
    }
}

impl fmt::Display for DateBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateBound::Naive(naive) => write!(f, "{}", naive.format("%Y-%m-%d %H:%M:%S")),
            DateBound::Aware(aware) => f.write_str(&aware.to_rfc3339()),
        }
    }
}

impl DateBound {
    /// Convert to a naive UTC timestamp, reading naive bounds in `default_tz`.
    ///
    /// Ambiguous wall-clock times (DST fall-back) take the earlier instant.
    /// Times inside a DST gap use the offset in force at that wall-clock
    /// reading taken as UTC.
    pub fn to_utc_naive(&self, default_tz: Tz) -> NaiveDateTime {
        match self {
            DateBound::Aware(aware) => aware.naive_utc(),
            DateBound::Naive(naive) => match default_tz.from_local_datetime(naive) {
                LocalResult::Single(local) => local.naive_utc(),
                LocalResult::Ambiguous(earliest, _) => earliest.naive_utc(),
                LocalResult::None => {
                    let offset = default_tz.offset_from_utc_datetime(naive).fix();
                    *naive - offset
                }
            },
        }
    }
}

/// The zone naive bounds are read in: that of the newest entry.
pub fn default_time_zone(journal: &[Entry]) -> Tz {
    journal
        .last()
        .map(|e| e.date().timezone())
        .unwrap_or(Tz::UTC)
}

/// Keep entries created at or after `after` and strictly before `before`.
pub fn filter_by_date(
    journal: Vec<Entry>,
    after: Option<NaiveDateTime>,
    before: Option<NaiveDateTime>,
) -> Vec<Entry> {
    if after.is_none() && before.is_none() {
        return journal;
    }
    journal
        .into_iter()
        .filter(|e| {
            let created = e.creation_date();
            after.is_none_or(|a| created >= a) && before.is_none_or(|b| created < b)
        })
        .collect()
}

// ============================================================================
// Tags
// ============================================================================

/// Which tagged entries to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTagFilter", into = "RawTagFilter")]
pub enum TagFilter {
    /// Any entry with at least one tag.
    Any,
    /// Entries with at least one of these tags.
    Only(BTreeSet<String>),
}

pub const ANY_TAG: &str = "any";

impl TagFilter {
    /// Parse the command-line form: `any`, or a comma-separated tag list.
    pub fn parse(s: &str) -> TagFilter {
        if s.trim() == ANY_TAG {
            TagFilter::Any
        } else {
            TagFilter::Only(split_tags(s))
        }
    }
}

/// Split `a, b,c` into a tag set, dropping empty items.
pub fn split_tags(s: &str) -> BTreeSet<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTagFilter {
    Keyword(String),
    Tags(Vec<String>),
}

impl TryFrom<RawTagFilter> for TagFilter {
    type Error = String;

    fn try_from(raw: RawTagFilter) -> Result<Self, Self::Error> {
        match raw {
            RawTagFilter::Keyword(k) if k == ANY_TAG => Ok(TagFilter::Any),
            RawTagFilter::Keyword(k) => Err(format!(
                "tags must be \"{ANY_TAG}\" or a list of tags, got \"{k}\""
            )),
            RawTagFilter::Tags(tags) => Ok(TagFilter::Only(tags.into_iter().collect())),
        }
    }
}

impl From<TagFilter> for RawTagFilter {
    fn from(filter: TagFilter) -> Self {
        match filter {
            TagFilter::Any => RawTagFilter::Keyword(ANY_TAG.to_string()),
            TagFilter::Only(tags) => RawTagFilter::Tags(tags.into_iter().collect()),
        }
    }
}

fn intersects(entry: &Entry, tags: &BTreeSet<String>) -> bool {
    entry.tags().iter().any(|t| tags.contains(*t))
}

/// Keep tagged entries, optionally only those carrying one of the given tags.
pub fn filter_by_tag(journal: Vec<Entry>, filter: &TagFilter) -> Vec<Entry> {
    journal
        .into_iter()
        .filter(|e| match filter {
            TagFilter::Any => e.has_tags(),
            TagFilter::Only(tags) => intersects(e, tags),
        })
        .collect()
}

/// Drop entries carrying any of the given tags.
pub fn exclude_tags(journal: Vec<Entry>, tags: &BTreeSet<String>) -> Vec<Entry> {
    journal.into_iter().filter(|e| !intersects(e, tags)).collect()
}
