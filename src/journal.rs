//! Journal assembly.
//!
//! Turns a Day One folder into an ordered, fully time-zoned sequence of
//! [`Entry`] values.
//!
//! ## Folder layout
//!
//! ```text
//! Journal.dayone/
//! ├── entries/
//! │   ├── 0A1B….doentry        # one property list per entry
//! │   └── 9F3C….doentry
//! └── photos/                  # optional
//!     └── 0A1B….jpg            # stem matches the entry UUID
//! ```
//!
//! ## Steps
//!
//! 1. Parse every `.doentry` file. Entries without a creation date are
//!    dropped; any other parse failure aborts. Entries sharing a UUID
//!    collapse to the last one parsed.
//! 2. Attach photos whose file stem equals an entry UUID.
//! 3. Sort by creation date (stable).
//! 4. Back-fill time zones from newest to oldest: each entry without a
//!    declared zone takes the nearest later declaration, and entries newer
//!    than every declaration take the newest declaration (UTC when nothing
//!    declares one).
//! 5. Localize each creation date into its resolved zone.

use crate::entry::{Entry, ParseError, ParsedEntry, parse_entry};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const ENTRY_EXTENSION: &str = "doentry";
pub const ENTRIES_DIR: &str = "entries";
pub const PHOTOS_DIR: &str = "photos";
/// Zone assigned when no entry in the journal declares one.
pub const DEFAULT_TIME_ZONE: &str = "UTC";

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Unable to list entries in {}: {source}", path.display())]
    ListEntries {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("No journal entries found in {}", .0.display())]
    EmptyJournal(PathBuf),
}

/// Parse the journal in `folder`, sorted by creation date.
pub fn parse_journal(folder: &Path) -> Result<Vec<Entry>, JournalError> {
    let entries_dir = folder.join(ENTRIES_DIR);
    let sources = list_files(&entries_dir)
        .map_err(|source| JournalError::ListEntries {
            path: entries_dir.clone(),
            source,
        })?
        .into_iter()
        .filter(|p| {
            p.extension()
                .map(|e| e == ENTRY_EXTENSION)
                .unwrap_or(false)
        });

    let mut parsed = Vec::new();
    let mut by_uuid: HashMap<String, usize> = HashMap::new();
    for source in sources {
        let entry = match parse_entry(&source) {
            Ok(entry) => entry,
            Err(err) if err.is_missing_creation_date() => {
                debug!(path = %source.display(), "skipping entry without creation date");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        match by_uuid.get(entry.uuid()) {
            Some(&idx) => {
                debug!(uuid = entry.uuid(), path = %source.display(), "duplicate UUID replaces earlier entry");
                parsed[idx] = entry;
            }
            None => {
                by_uuid.insert(entry.uuid().to_string(), parsed.len());
                parsed.push(entry);
            }
        }
    }

    if parsed.is_empty() {
        return Err(JournalError::EmptyJournal(folder.to_path_buf()));
    }

    let photos = correlate_photos(folder, &by_uuid);

    parsed.sort_by_key(ParsedEntry::creation_date);
    let journal = backfill_time_zones(parsed, photos);
    info!(entries = journal.len(), folder = %folder.display(), "parsed journal");
    Ok(journal)
}

/// Map entry UUIDs to photo paths relative to the journal folder.
///
/// A missing `photos/` directory means no photos; files that match no
/// entry are ignored.
fn correlate_photos(folder: &Path, uuids: &HashMap<String, usize>) -> HashMap<String, PathBuf> {
    let mut photos = HashMap::new();
    let Ok(files) = list_files(&folder.join(PHOTOS_DIR)) else {
        debug!(folder = %folder.display(), "no photos directory");
        return photos;
    };
    for file in files {
        let (Some(stem), Some(name)) = (file.file_stem(), file.file_name()) else {
            continue;
        };
        let stem = stem.to_string_lossy();
        if uuids.contains_key(stem.as_ref()) {
            photos.insert(stem.into_owned(), Path::new(PHOTOS_DIR).join(name));
        } else {
            debug!(photo = %file.display(), "photo has no matching entry");
        }
    }
    photos
}

/// Resolve every entry's time zone and build the final entries.
///
/// `parsed` must already be sorted oldest first.
fn backfill_time_zones(
    parsed: Vec<ParsedEntry>,
    mut photos: HashMap<String, PathBuf>,
) -> Vec<Entry> {
    let newest_tz = parsed
        .iter()
        .rev()
        .find_map(ParsedEntry::declared_time_zone)
        .unwrap_or(DEFAULT_TIME_ZONE)
        .to_string();

    let mut current = newest_tz;
    let mut journal = Vec::with_capacity(parsed.len());
    for entry in parsed.into_iter().rev() {
        if let Some(declared) = entry.declared_time_zone() {
            current = declared.to_string();
        }
        let photo = photos.remove(entry.uuid());
        let tz = resolve_time_zone(&current);
        journal.push(Entry::enrich(entry, &current, tz, photo));
    }
    journal.reverse();
    journal
}

/// Look up an IANA zone name, case-insensitively. Unknown names fall back
/// to UTC.
pub fn resolve_time_zone(name: &str) -> Tz {
    Tz::from_str_insensitive(name).unwrap_or_else(|_| {
        debug!(time_zone = name, "unknown time zone, using UTC");
        Tz::UTC
    })
}

fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    // Directory order is platform dependent; sorting keeps duplicate
    // resolution reproducible.
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SourceFault;
    use crate::test_helpers::*;

    fn tz(name: &str) -> String {
        format!("<key>Time Zone</key><string>{name}</string>")
    }

    // =========================================================================
    // Discovery and ordering
    // =========================================================================

    #[test]
    fn entries_sorted_by_creation_date() {
        let journal = JournalBuilder::new()
            .entry("C", "2014-03-01T00:00:00Z", "")
            .entry("A", "2014-01-01T00:00:00Z", "")
            .entry("B", "2014-02-01T00:00:00Z", "");
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(uuids(&entries), vec!["A", "B", "C"]);
    }

    #[test]
    fn equal_timestamps_keep_encounter_order() {
        // Files are visited in name order: a.doentry, b.doentry, c.doentry
        let journal = JournalBuilder::new()
            .raw_entry("a.doentry", &doentry("Z", "2014-01-01T00:00:00Z", ""))
            .raw_entry("b.doentry", &doentry("Y", "2014-01-01T00:00:00Z", ""))
            .raw_entry("c.doentry", &doentry("X", "2013-01-01T00:00:00Z", ""));
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(uuids(&entries), vec!["X", "Z", "Y"]);
    }

    #[test]
    fn non_entry_files_ignored() {
        let journal = JournalBuilder::new()
            .entry("A", "2014-01-01T00:00:00Z", "")
            .raw_entry("notes.txt", "not an entry")
            .raw_entry(".DS_Store", "");
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(uuids(&entries), vec!["A"]);
    }

    #[test]
    fn entries_without_creation_date_dropped() {
        let journal = JournalBuilder::new()
            .entry("A", "2014-01-01T00:00:00Z", "")
            .raw_entry(
                "B.doentry",
                &plist_dict("<key>UUID</key><string>B</string>"),
            );
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(uuids(&entries), vec!["A"]);
    }

    #[test]
    fn corrupt_entry_aborts() {
        let journal = JournalBuilder::new()
            .entry("A", "2014-01-01T00:00:00Z", "")
            .raw_entry("B.doentry", "<plist><dict><key>oops");
        let err = parse_journal(journal.path()).unwrap_err();
        match err {
            JournalError::Parse(ParseError::MalformedSource { path, source }) => {
                assert!(path.ends_with("B.doentry"));
                assert!(matches!(source, SourceFault::Decode(_)));
            }
            other => panic!("expected MalformedSource, got {other:?}"),
        }
    }

    #[test]
    fn missing_uuid_aborts() {
        let journal = JournalBuilder::new().raw_entry(
            "B.doentry",
            &plist_dict("<key>Creation Date</key><date>2014-01-01T00:00:00Z</date>"),
        );
        let err = parse_journal(journal.path()).unwrap_err();
        assert!(matches!(
            err,
            JournalError::Parse(ParseError::MissingRequiredField { field: "UUID", .. })
        ));
    }

    #[test]
    fn empty_journal_is_error() {
        let journal = JournalBuilder::new();
        let err = parse_journal(journal.path()).unwrap_err();
        assert!(matches!(err, JournalError::EmptyJournal(_)));
    }

    #[test]
    fn journal_of_only_dropped_entries_is_empty() {
        let journal = JournalBuilder::new().raw_entry(
            "B.doentry",
            &plist_dict("<key>UUID</key><string>B</string>"),
        );
        let err = parse_journal(journal.path()).unwrap_err();
        assert!(matches!(err, JournalError::EmptyJournal(_)));
    }

    #[test]
    fn missing_entries_dir_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = parse_journal(tmp.path()).unwrap_err();
        assert!(matches!(err, JournalError::ListEntries { .. }));
    }

    #[test]
    fn entries_path_that_is_a_file_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("entries"), "not a directory").unwrap();
        let err = parse_journal(tmp.path()).unwrap_err();
        assert!(matches!(err, JournalError::ListEntries { .. }));
    }

    #[test]
    fn list_files_skips_directories_and_sorts() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("b.doentry"), "").unwrap();
        fs::write(tmp.path().join("a.doentry"), "").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        let names: Vec<_> = list_files(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.doentry", "b.doentry"]);
        assert!(list_files(&tmp.path().join("a.doentry")).is_err());
    }

    #[test]
    fn duplicate_uuid_last_parsed_wins() {
        let journal = JournalBuilder::new()
            .raw_entry(
                "1.doentry",
                &doentry("A", "2014-01-01T00:00:00Z", "<key>Entry Text</key><string>first</string>"),
            )
            .raw_entry(
                "2.doentry",
                &doentry("A", "2014-01-02T00:00:00Z", "<key>Entry Text</key><string>second</string>"),
            );
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text(), "second");
    }

    // =========================================================================
    // Photos
    // =========================================================================

    #[test]
    fn photo_attached_by_uuid() {
        let journal = JournalBuilder::new()
            .entry("A", "2014-01-01T00:00:00Z", "")
            .entry("B", "2014-01-02T00:00:00Z", "")
            .photo("A", "jpg");
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(
            find_entry(&entries, "A").photo(),
            Some(Path::new("photos/A.jpg"))
        );
        assert_eq!(find_entry(&entries, "B").photo(), None);
    }

    #[test]
    fn orphan_photos_ignored() {
        let journal = JournalBuilder::new()
            .entry("A", "2014-01-01T00:00:00Z", "")
            .photo("nobody", "jpg");
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(find_entry(&entries, "A").photo(), None);
    }

    #[test]
    fn missing_photos_dir_is_fine() {
        let journal = JournalBuilder::new().entry("A", "2014-01-01T00:00:00Z", "");
        assert!(!journal.path().join(PHOTOS_DIR).exists());
        assert!(parse_journal(journal.path()).is_ok());
    }

    // =========================================================================
    // Time zone back-fill
    // =========================================================================

    #[test]
    fn single_declaration_fills_everything() {
        let journal = JournalBuilder::new()
            .entry("E1", "2014-01-01T00:00:00Z", "")
            .entry("E2", "2014-01-02T00:00:00Z", &tz("America/New_York"))
            .entry("E3", "2014-01-03T00:00:00Z", "");
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(
            time_zones(&entries),
            vec!["America/New_York", "America/New_York", "America/New_York"]
        );
    }

    #[test]
    fn earlier_entries_inherit_nearest_later_declaration() {
        let journal = JournalBuilder::new()
            .entry("E1", "2014-01-01T00:00:00Z", "")
            .entry("E2", "2014-01-02T00:00:00Z", &tz("Europe/Paris"))
            .entry("E3", "2014-01-03T00:00:00Z", "")
            .entry("E4", "2014-01-04T00:00:00Z", &tz("Asia/Tokyo"))
            .entry("E5", "2014-01-05T00:00:00Z", "");
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(
            time_zones(&entries),
            vec![
                "Europe/Paris",
                "Europe/Paris",
                "Asia/Tokyo",
                "Asia/Tokyo",
                "Asia/Tokyo"
            ]
        );
    }

    #[test]
    fn no_declarations_default_to_utc() {
        let journal = JournalBuilder::new()
            .entry("A", "2014-01-01T00:00:00Z", "")
            .entry("B", "2014-01-02T00:00:00Z", "");
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(time_zones(&entries), vec!["UTC", "UTC"]);
        assert_eq!(entries[0].date().timezone(), Tz::UTC);
    }

    #[test]
    fn localized_date_uses_resolved_zone() {
        let journal = JournalBuilder::new()
            .entry("A", "2014-07-01T16:30:00Z", "")
            .entry("B", "2014-07-02T00:00:00Z", &tz("America/New_York"));
        let entries = parse_journal(journal.path()).unwrap();
        let a = find_entry(&entries, "A");
        assert_eq!(a.date().to_rfc3339(), "2014-07-01T12:30:00-04:00");
        assert_eq!(a.creation_date().to_string(), "2014-07-01 16:30:00");
    }

    #[test]
    fn unknown_zone_localizes_as_utc_but_keeps_name() {
        let journal =
            JournalBuilder::new().entry("A", "2014-01-01T12:00:00Z", &tz("Mars/Olympus_Mons"));
        let entries = parse_journal(journal.path()).unwrap();
        assert_eq!(entries[0].time_zone(), "Mars/Olympus_Mons");
        assert_eq!(entries[0].date().timezone(), Tz::UTC);
    }

    #[test]
    fn zone_names_match_case_insensitively() {
        assert_eq!(resolve_time_zone("utc"), Tz::UTC);
        assert_eq!(
            resolve_time_zone("europe/paris"),
            chrono_tz::Europe::Paris
        );
    }
}
