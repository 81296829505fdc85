//! Shared test utilities for the dayone-export test suite.
//!
//! Builds Day One folders on disk and offers lookup helpers that work with
//! assembled entries.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let journal = JournalBuilder::new()
//!     .entry("A", "2014-01-01T12:00:00Z", "<key>Time Zone</key><string>Europe/Paris</string>")
//!     .photo("A", "jpg");
//! let entries = parse_journal(journal.path()).unwrap();
//!
//! assert_eq!(uuids(&entries), vec!["A"]);
//! assert_eq!(find_entry(&entries, "A").time_zone(), "Europe/Paris");
//! ```

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::entry::Entry;

// =========================================================================
// Property list sources
// =========================================================================

/// Wrap raw `<key>…</key><value>` pairs in a plist dictionary document.
pub fn plist_dict(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
{body}
</dict>
</plist>
"#
    )
}

/// A `.doentry` document with the required fields plus `extra` raw plist pairs.
pub fn doentry(uuid: &str, creation_date: &str, extra: &str) -> String {
    plist_dict(&format!(
        "<key>UUID</key><string>{uuid}</string>\n\
         <key>Creation Date</key><date>{creation_date}</date>\n\
         {extra}"
    ))
}

// =========================================================================
// Journal folders
// =========================================================================

/// Builds a Day One folder (`entries/`, optionally `photos/`) in a temp dir.
pub struct JournalBuilder {
    dir: TempDir,
}

impl JournalBuilder {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("entries")).unwrap();
        Self { dir }
    }

    /// Add `entries/<uuid>.doentry`.
    pub fn entry(self, uuid: &str, creation_date: &str, extra: &str) -> Self {
        self.raw_entry(
            &format!("{uuid}.doentry"),
            &doentry(uuid, creation_date, extra),
        )
    }

    /// Add an arbitrary file under `entries/`.
    pub fn raw_entry(self, filename: &str, contents: &str) -> Self {
        fs::write(self.dir.path().join("entries").join(filename), contents).unwrap();
        self
    }

    /// Add `photos/<stem>.<ext>` with placeholder bytes.
    pub fn photo(self, stem: &str, ext: &str) -> Self {
        let photos = self.dir.path().join("photos");
        fs::create_dir_all(&photos).unwrap();
        fs::write(photos.join(format!("{stem}.{ext}")), b"fake image").unwrap();
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

// =========================================================================
// Lookups: panic with a clear message on miss
// =========================================================================

/// Find an entry by UUID. Panics if not found.
pub fn find_entry<'a>(entries: &'a [Entry], uuid: &str) -> &'a Entry {
    entries.iter().find(|e| e.uuid() == uuid).unwrap_or_else(|| {
        let all = uuids(entries);
        panic!("entry '{uuid}' not found. Available: {all:?}")
    })
}

/// All UUIDs in sequence order.
pub fn uuids(entries: &[Entry]) -> Vec<&str> {
    entries.iter().map(Entry::uuid).collect()
}

/// All resolved time zones in sequence order.
pub fn time_zones(entries: &[Entry]) -> Vec<&str> {
    entries.iter().map(Entry::time_zone).collect()
}
