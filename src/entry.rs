//! Parsing and normalization of a single journal entry.
//!
//! Day One stores each entry as an XML property list in
//! `entries/<UUID>.doentry`. The records are loosely shaped: apart from
//! the creation timestamp and the identifier almost every key is optional,
//! and several groups of related values live in nested dictionaries.
//!
//! ## Normalization
//!
//! [`normalize`] turns the decoded property list into a [`ParsedEntry`]:
//!
//! - `Entry Text` is renamed to `Text` (empty string when absent).
//! - The `Location`, `Weather`, `Music` and `Creator` dictionaries are
//!   flattened into the top level. Existing top-level keys always win, so a
//!   nested `Country` never replaces a top-level `Country`. The nested
//!   dictionaries themselves are kept.
//! - `Creation Date` is required. It is a naive timestamp holding the UTC
//!   time of creation.
//!
//! ## Two phases
//!
//! A [`ParsedEntry`] knows nothing about its neighbours. The journal
//! assembler consumes it together with the resolved time zone and the
//! optional photo path and produces an [`Entry`], which is immutable from
//! then on. Fields only the assembler can know (`Time Zone`, `Photo`, the
//! localized `Date`) therefore never exist in a half-filled state.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

pub const CREATION_DATE: &str = "Creation Date";
pub const ENTRY_TEXT: &str = "Entry Text";
pub const TEXT: &str = "Text";
pub const UUID: &str = "UUID";
pub const TIME_ZONE: &str = "Time Zone";
pub const PHOTO: &str = "Photo";
pub const DATE: &str = "Date";
pub const TAGS: &str = "Tags";
pub const LOCATION: &str = "Location";
pub const WEATHER: &str = "Weather";

/// Nested records merged into the top level, in merge order.
const FLATTENED: &[&str] = &["Location", "Weather", "Music", "Creator"];

/// Location keys from most to least specific.
const PLACE_KEYS: [&str; 4] = ["Place Name", "Locality", "Administrative Area", "Country"];

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unable to parse {}: {source}", path.display())]
    MalformedSource {
        path: PathBuf,
        #[source]
        source: SourceFault,
    },
    #[error("Missing required field '{field}' in {}", path.display())]
    MissingRequiredField { path: PathBuf, field: &'static str },
}

impl ParseError {
    /// The one failure the journal assembler recovers from by dropping the entry.
    pub fn is_missing_creation_date(&self) -> bool {
        matches!(
            self,
            ParseError::MissingRequiredField {
                field: CREATION_DATE,
                ..
            }
        )
    }

    pub fn path(&self) -> &Path {
        match self {
            ParseError::MalformedSource { path, .. }
            | ParseError::MissingRequiredField { path, .. } => path,
        }
    }
}

/// Why a source could not be turned into an entry.
///
/// `Io` means the bytes never arrived; everything else means the bytes
/// arrived and are wrong.
#[derive(Error, Debug)]
pub enum SourceFault {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid property list: {0}")]
    Decode(#[from] plist::Error),
    #[error("top-level value is not a dictionary")]
    NotADictionary,
    #[error("field '{field}' is not a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl SourceFault {
    pub fn is_io(&self) -> bool {
        matches!(self, SourceFault::Io(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid argument: {0}")]
pub struct InvalidArgument(pub String);

// ============================================================================
// Field values
// ============================================================================

/// A single value from an entry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Field {
    String(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    #[serde(serialize_with = "serialize_naive")]
    Date(NaiveDateTime),
    #[serde(serialize_with = "serialize_data")]
    Data(Vec<u8>),
    List(Vec<Field>),
    Map(BTreeMap<String, Field>),
}

impl Field {
    /// Convert a decoded property list value. UIDs have no meaning outside
    /// keyed archives and are dropped.
    pub fn from_plist(value: plist::Value) -> Option<Field> {
        let field = match value {
            plist::Value::String(s) => Field::String(s),
            plist::Value::Boolean(b) => Field::Boolean(b),
            plist::Value::Real(r) => Field::Real(r),
            plist::Value::Integer(i) => match i.as_signed() {
                Some(n) => Field::Integer(n),
                None => Field::Real(i.as_unsigned()? as f64),
            },
            plist::Value::Date(d) => {
                Field::Date(DateTime::<Utc>::from(SystemTime::from(d)).naive_utc())
            }
            plist::Value::Data(bytes) => Field::Data(bytes),
            plist::Value::Array(items) => {
                Field::List(items.into_iter().filter_map(Field::from_plist).collect())
            }
            plist::Value::Dictionary(dict) => Field::Map(
                dict.into_iter()
                    .filter_map(|(k, v)| Field::from_plist(v).map(|f| (k, f)))
                    .collect(),
            ),
            _ => return None,
        };
        Some(field)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Field::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Field>> {
        match self {
            Field::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Field]> {
        match self {
            Field::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::String(s) => f.write_str(s),
            Field::Integer(n) => write!(f, "{n}"),
            Field::Real(r) => write!(f, "{r}"),
            Field::Boolean(b) => write!(f, "{b}"),
            Field::Date(d) => write!(f, "{d}"),
            Field::Data(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Field::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Field::Map(_) => f.write_str("{...}"),
        }
    }
}

fn serialize_naive<S: Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&date.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn serialize_data<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&BASE64.encode(bytes))
}

// ============================================================================
// Parsed entry (phase one)
// ============================================================================

/// An entry as read from disk, before journal-wide information is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    uuid: String,
    creation_date: NaiveDateTime,
    fields: BTreeMap<String, Field>,
}

impl ParsedEntry {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn creation_date(&self) -> NaiveDateTime {
        self.creation_date
    }

    /// The time zone the record itself declares, if any.
    pub fn declared_time_zone(&self) -> Option<&str> {
        self.fields.get(TIME_ZONE).and_then(Field::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }
}

/// Read and normalize the entry stored at `path`.
pub fn parse_entry(path: &Path) -> Result<ParsedEntry, ParseError> {
    let malformed = |source: SourceFault| ParseError::MalformedSource {
        path: path.to_path_buf(),
        source,
    };
    let bytes = fs::read(path).map_err(|e| malformed(e.into()))?;
    let value = plist::Value::from_reader(Cursor::new(bytes)).map_err(|e| malformed(e.into()))?;
    normalize(value, path)
}

/// Normalize a decoded record. `path` is only used for error context.
pub fn normalize(value: plist::Value, path: &Path) -> Result<ParsedEntry, ParseError> {
    let malformed = |source: SourceFault| ParseError::MalformedSource {
        path: path.to_path_buf(),
        source,
    };
    let missing = |field: &'static str| ParseError::MissingRequiredField {
        path: path.to_path_buf(),
        field,
    };

    let plist::Value::Dictionary(dict) = value else {
        return Err(malformed(SourceFault::NotADictionary));
    };
    let mut fields: BTreeMap<String, Field> = dict
        .into_iter()
        .filter_map(|(k, v)| Field::from_plist(v).map(|f| (k, f)))
        .collect();

    let creation_date = match fields.get(CREATION_DATE) {
        None => return Err(missing(CREATION_DATE)),
        Some(field) => field.as_date().ok_or_else(|| {
            malformed(SourceFault::WrongType {
                field: CREATION_DATE,
                expected: "date",
            })
        })?,
    };

    let text = match fields.remove(ENTRY_TEXT) {
        Some(Field::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    fields.insert(TEXT.to_string(), Field::String(text));

    for record in FLATTENED {
        let Some(Field::Map(nested)) = fields.get(*record) else {
            continue;
        };
        let additions: Vec<(String, Field)> = nested
            .iter()
            .filter(|(k, _)| !fields.contains_key(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        fields.extend(additions);
    }

    let uuid = match fields.get(UUID) {
        None => return Err(missing(UUID)),
        Some(field) => field
            .as_str()
            .ok_or_else(|| {
                malformed(SourceFault::WrongType {
                    field: UUID,
                    expected: "string",
                })
            })?
            .to_string(),
    };

    Ok(ParsedEntry {
        uuid,
        creation_date,
        fields,
    })
}

// ============================================================================
// Enriched entry (phase two)
// ============================================================================

/// A fully assembled journal entry.
///
/// Serializes to a flat map of every record field plus `Time Zone`, the
/// localized `Date` (RFC 3339) and, when a photo is attached, `Photo`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    uuid: String,
    creation_date: NaiveDateTime,
    time_zone: String,
    date: DateTime<Tz>,
    photo: Option<PathBuf>,
    fields: BTreeMap<String, Field>,
}

impl Entry {
    /// Fix the journal-derived attributes of a parsed entry.
    ///
    /// `time_zone` is stored verbatim; `tz` is what it resolved to (UTC
    /// when the identifier is unknown).
    pub fn enrich(parsed: ParsedEntry, time_zone: &str, tz: Tz, photo: Option<PathBuf>) -> Entry {
        let ParsedEntry {
            uuid,
            creation_date,
            mut fields,
        } = parsed;
        let previous = fields.insert(TIME_ZONE.to_string(), Field::String(time_zone.to_string()));
        if let Some(value) = previous.filter(|v| v.as_str().is_none()) {
            debug!(uuid = %uuid, ?value, time_zone, "replacing non-string time zone");
        }
        if let Some(photo) = &photo {
            fields.insert(
                PHOTO.to_string(),
                Field::String(photo.to_string_lossy().into_owned()),
            );
        }
        Entry {
            uuid,
            creation_date,
            time_zone: time_zone.to_string(),
            date: tz.from_utc_datetime(&creation_date),
            photo,
            fields,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Creation time as a naive UTC timestamp.
    pub fn creation_date(&self) -> NaiveDateTime {
        self.creation_date
    }

    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    /// Creation time in the entry's resolved time zone.
    pub fn date(&self) -> &DateTime<Tz> {
        &self.date
    }

    /// Photo path relative to the journal folder.
    pub fn photo(&self) -> Option<&Path> {
        self.photo.as_deref()
    }

    pub fn text(&self) -> &str {
        self.get(TEXT).and_then(Field::as_str).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// String tags of the entry; non-string list items are ignored.
    pub fn tags(&self) -> Vec<&str> {
        self.get(TAGS)
            .and_then(Field::as_list)
            .map(|items| items.iter().filter_map(Field::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_tags(&self) -> bool {
        !self.tags().is_empty()
    }

    /// The entry's location as a comma-separated string.
    ///
    /// See [`format_place`] for the meaning of the arguments. Entries
    /// without a `Location` record yield an empty string.
    pub fn place(&self, levels: &PlaceLevels, ignore: &[&str]) -> Result<String, InvalidArgument> {
        format_place(
            self.contains(LOCATION),
            |key| self.get(key).and_then(Field::as_str),
            levels,
            ignore,
        )
    }

    /// Temperature and description, e.g. `21&deg; Sunny`.
    pub fn weather(&self, unit: &str) -> String {
        if !self.contains(WEATHER) {
            return String::new();
        }
        let temperature = self
            .get(temperature_key(unit))
            .map(ToString::to_string)
            .unwrap_or_default();
        let description = self
            .get("Description")
            .map(ToString::to_string)
            .unwrap_or_default();
        format_weather(&temperature, &description)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Entry at {}>", self.creation_date)
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(None)?;
        for (key, value) in self.fields.iter().filter(|(k, _)| k.as_str() != DATE) {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(DATE, &self.date.to_rfc3339())?;
        map.end()
    }
}

// ============================================================================
// Place and weather formatting
// ============================================================================

/// Which location levels to include.
///
/// Level 0 is the place name, 1 the locality (city), 2 the administrative
/// area (state) and 3 the country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceLevels {
    /// The `n` most specific levels. Counts above 4 include every level.
    Count(usize),
    /// Explicit levels, in output order.
    Levels(Vec<usize>),
}

impl Default for PlaceLevels {
    fn default() -> Self {
        PlaceLevels::Count(PLACE_KEYS.len())
    }
}

/// Join location names at the requested levels with `", "`.
///
/// Empty names and names listed in `ignore` are skipped. Returns an empty
/// string when `has_location` is false. Arguments are checked first, so a
/// bad level is reported even for entries without a location.
pub fn format_place<'a>(
    has_location: bool,
    lookup: impl Fn(&str) -> Option<&'a str>,
    levels: &PlaceLevels,
    ignore: &[&str],
) -> Result<String, InvalidArgument> {
    let keys: Vec<&str> = match levels {
        PlaceLevels::Count(n) => PLACE_KEYS.iter().take(*n).copied().collect(),
        PlaceLevels::Levels(levels) => levels
            .iter()
            .map(|&level| {
                PLACE_KEYS.get(level).copied().ok_or_else(|| {
                    InvalidArgument(format!("place level {level} is out of range (0-3)"))
                })
            })
            .collect::<Result<_, _>>()?,
    };

    if !has_location {
        return Ok(String::new());
    }

    let names: Vec<&str> = keys
        .into_iter()
        .filter_map(&lookup)
        .filter(|name| !name.is_empty() && !ignore.contains(name))
        .collect();
    Ok(names.join(", "))
}

/// `c` or `celsius` (any case) selects Celsius; anything else Fahrenheit.
pub fn temperature_key(unit: &str) -> &'static str {
    if unit.eq_ignore_ascii_case("c") || unit.eq_ignore_ascii_case("celsius") {
        "Celsius"
    } else {
        "Fahrenheit"
    }
}

pub fn format_weather(temperature: &str, description: &str) -> String {
    format!("{temperature}&deg; {description}")
}
