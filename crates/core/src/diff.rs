//! Textual diffs, binary classification and binary summaries.
//!
//! Everything here is a pure function over its inputs. Callers read the
//! files; these functions only look at bytes and metadata.

use std::fs::Metadata;
use std::path::Path;

use chrono::{DateTime, Local};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use serde::{Deserialize, Serialize};

use crate::models::{ChangeHunk, ChangeKind};

/// Bytes inspected by the content heuristic (same window git uses).
const SAMPLE_LEN: usize = 8000;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

const BINARY_EXTENSIONS: &[&str] = &[
    "7z", "a", "avi", "bin", "bmp", "bz2", "class", "dat", "db", "dll", "dylib", "eot", "exe",
    "flac", "gif", "gz", "ico", "jar", "jpeg", "jpg", "mkv", "mov", "mp3", "mp4", "node", "o",
    "ogg", "otf", "pdf", "png", "psd", "pyc", "rar", "so", "sqlite", "tar", "tgz", "tif", "tiff",
    "ttf", "war", "wasm", "wav", "webm", "webp", "woff", "woff2", "xz", "zip",
];

const TEXT_EXTENSIONS: &[&str] = &[
    "bash", "c", "cfg", "cjs", "conf", "cpp", "css", "csv", "editorconfig", "ejs", "env",
    "gitattributes", "gitignore", "go", "h", "hbs", "hpp", "htm", "html", "ini", "java", "js",
    "json", "jsx", "less", "lock", "md", "mjs", "npmrc", "py", "rb", "rs", "scss", "sh", "svg",
    "toml", "ts", "tsx", "txt", "vue", "xml", "yaml", "yml", "zsh",
];

/// Options forwarded to the text diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// Case-only differences do not count as modifications.
    #[serde(default)]
    pub ignore_case: bool,
}

/// Result of [`compute_text_diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDiff {
    pub hunks: Vec<ChangeHunk>,
    pub modified: bool,
}

// ---------------------------------------------------------------------------
// Binary classification
// ---------------------------------------------------------------------------

/// Decide whether `path` holds binary data.
///
/// Known extensions decide immediately. Otherwise the existing bytes (if
/// any) and then the proposed bytes go through the content heuristic.
pub fn classify_binary(path: &Path, existing: Option<&[u8]>, proposed: Option<&[u8]>) -> bool {
    let extension = extension_key(path);
    if BINARY_EXTENSIONS.contains(&extension.as_str()) {
        return true;
    }
    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        return false;
    }

    existing.is_some_and(looks_binary) || proposed.is_some_and(looks_binary)
}

fn extension_key(path: &Path) -> String {
    let key = match path.extension() {
        Some(ext) => ext.to_string_lossy(),
        None => path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default(),
    };
    key.trim_start_matches('.').to_ascii_lowercase()
}

/// Null bytes or a high ratio of control characters mean binary.
pub fn looks_binary(data: &[u8]) -> bool {
    let sample = &data[..data.len().min(SAMPLE_LEN)];
    if sample.is_empty() || sample.starts_with(UTF8_BOM) {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }

    // A multi-byte character cut by the sample window is still text.
    match std::str::from_utf8(sample) {
        Ok(_) => return false,
        Err(err) if err.error_len().is_none() => return false,
        Err(_) => {}
    }

    // Control chars except tab, LF, VT, FF, CR and ESC.
    let suspicious = sample
        .iter()
        .filter(|&&b| b < 8 || (b > 13 && b < 32 && b != 27))
        .count();
    suspicious * 10 > sample.len()
}

// ---------------------------------------------------------------------------
// Text diff
// ---------------------------------------------------------------------------

/// Diff `old` against `new`.
///
/// With `ignore_whitespace` the diff is word-level and only hunks with
/// non-whitespace content count as modifications. Otherwise the diff is
/// line-level and any added or removed line counts.
pub fn compute_text_diff(
    old: &str,
    new: &str,
    ignore_whitespace: bool,
    options: &DiffOptions,
) -> TextDiff {
    let hunks = if ignore_whitespace {
        word_hunks(old, new)
    } else {
        line_hunks(old, new)
    };

    let modified = if options.ignore_case {
        let (old, new) = (old.to_lowercase(), new.to_lowercase());
        let folded = if ignore_whitespace {
            word_hunks(&old, &new)
        } else {
            line_hunks(&old, &new)
        };
        is_modified(&folded, ignore_whitespace)
    } else {
        is_modified(&hunks, ignore_whitespace)
    };

    TextDiff { hunks, modified }
}

fn is_modified(hunks: &[ChangeHunk], ignore_whitespace: bool) -> bool {
    if ignore_whitespace {
        hunks
            .iter()
            .any(|hunk| hunk.is_change() && !hunk.value.trim().is_empty())
    } else {
        hunks.len() > 1 || hunks.first().is_some_and(ChangeHunk::is_change)
    }
}

fn line_hunks(old: &str, new: &str) -> Vec<ChangeHunk> {
    // Enough context to fold the whole file into a single hunk.
    let context = old.lines().count() + new.lines().count() + 1;
    let mut options = diffy::DiffOptions::new();
    options.set_context_len(context);
    let patch = options.create_patch(old, new);

    let mut hunks = Vec::new();
    if patch.hunks().is_empty() {
        if !old.is_empty() {
            hunks.push(ChangeHunk::new(ChangeKind::Unchanged, old));
        }
        return hunks;
    }

    for hunk in patch.hunks() {
        for line in hunk.lines() {
            let (kind, text) = match line {
                diffy::Line::Context(text) => (ChangeKind::Unchanged, *text),
                diffy::Line::Delete(text) => (ChangeKind::Removed, *text),
                diffy::Line::Insert(text) => (ChangeKind::Added, *text),
            };
            push_hunk(&mut hunks, kind, text);
        }
    }
    hunks
}

fn word_hunks(old: &str, new: &str) -> Vec<ChangeHunk> {
    let diff = similar::TextDiff::from_words(old, new);
    let mut hunks = Vec::new();
    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            similar::ChangeTag::Equal => ChangeKind::Unchanged,
            similar::ChangeTag::Delete => ChangeKind::Removed,
            similar::ChangeTag::Insert => ChangeKind::Added,
        };
        push_hunk(&mut hunks, kind, change.value());
    }
    hunks
}

fn push_hunk(hunks: &mut Vec<ChangeHunk>, kind: ChangeKind, text: &str) {
    match hunks.last_mut() {
        Some(last) if last.kind == kind => last.value.push_str(text),
        _ => hunks.push(ChangeHunk::new(kind, text)),
    }
}

// ---------------------------------------------------------------------------
// Binary summary
// ---------------------------------------------------------------------------

/// Table comparing the existing file's size and mtime to the replacement.
pub fn render_binary_diff_summary(existing: &Metadata, proposed: Option<&[u8]>) -> String {
    let existing_size = existing.len();
    let new_size = proposed.map_or(0, |bytes| bytes.len() as u64);
    let sign = if existing_size > new_size { '-' } else { '+' };
    let size_diff = format!("{sign}{}", format_bytes(existing_size.abs_diff(new_size)));

    let modified = existing
        .modified()
        .ok()
        .map(|time| {
            DateTime::<Local>::from(time)
                .format("%a %b %d %Y %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["", "Existing", "Replacement", "Diff"]);
    table.add_row(vec![
        Cell::new("Size"),
        Cell::new(format_bytes(existing_size)),
        Cell::new(format_bytes(new_size)),
        Cell::new(size_diff),
    ]);
    table.add_row(vec![
        Cell::new("Last modified"),
        Cell::new(modified),
        Cell::new(""),
        Cell::new(""),
    ]);
    table.to_string()
}

/// Human-readable decimal size with three significant digits.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    let digits = if value >= 100.0 {
        format!("{value:.0}")
    } else if value >= 10.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.2}")
    };
    let digits = if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits.as_str()
    };
    format!("{digits} {}", UNITS[unit])
}
