//! CLI output formatting.
//!
//! Rendered documents go to stdout only when no output file is given; in
//! that case nothing else is printed there. When documents are written to
//! files, one line per file follows, then a summary:
//!
//! ```text
//! journal-2014-01.html (12.3 KB)
//! journal-2014-02.html (812 B)
//!
//! Wrote 2 files
//! ```
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use std::path::PathBuf;

/// One document written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    pub path: PathBuf,
    pub bytes: usize,
}

/// Human-readable byte count.
pub fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

pub fn format_written(files: &[Written]) -> Vec<String> {
    if files.is_empty() {
        return vec!["No entries matched; nothing written".to_string()];
    }
    let mut lines: Vec<String> = files
        .iter()
        .map(|f| format!("{} ({})", f.path.display(), format_size(f.bytes)))
        .collect();
    lines.push(String::new());
    let noun = if files.len() == 1 { "file" } else { "files" };
    lines.push(format!("Wrote {} {noun}", files.len()));
    lines
}

pub fn print_written(files: &[Written]) {
    for line in format_written(files) {
        println!("{line}");
    }
}
