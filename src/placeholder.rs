//! Placeholder token grammar and discovery.
//!
//! A placeholder is `{{`, optional whitespace, a key of `[A-Za-z0-9_]+`,
//! optional whitespace, `}}`. Discovery only keeps keys that pass a
//! confidence filter, so doubled braces belonging to some other templating
//! system are not mistaken for missing profile entries.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use regex::Regex;

use crate::classify::is_text;
use crate::constants::{
    COMMON_WORDS, GENERIC_NAMES, PLACEHOLDER_IGNORE_FILE, SENTINEL_SUBSTRINGS,
};
use crate::error::Result;
use crate::tree::{EntryKind, TreeWalk};

/// Any placeholder token; group 1 is the key.
pub static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// Byte-level twin of [`TOKEN`] for scanning binary files.
pub static TOKEN_BYTES: LazyLock<regex::bytes::Regex> =
    LazyLock::new(|| regex::bytes::Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// Canonical rendering of the token for `key`.
pub fn token(key: &str) -> String {
    format!("{{{{ {key} }}}}")
}

/// A single placeholder found while scanning a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    pub key: String,
    /// Token text exactly as it appears in the file
    pub raw: String,
}

impl std::fmt::Display for Occurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// Confidence filter applied to every discovered key.
pub fn is_valid_placeholder(key: &str) -> bool {
    if key.len() < 3 {
        return false;
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    let lower = key.to_ascii_lowercase();
    if COMMON_WORDS.contains(&lower.as_str()) {
        return false;
    }
    let upper = key.to_ascii_uppercase();
    if SENTINEL_SUBSTRINGS.iter().any(|s| upper.contains(s)) {
        return false;
    }
    if GENERIC_NAMES.contains(&upper.as_str()) {
        return false;
    }
    if key.chars().any(|c| c.is_ascii_alphabetic()) && key == lower {
        return false;
    }
    true
}

/// Reads the placeholder ignore file under `template_dir`.
///
/// One key per line; `#` starts a comment. A missing file yields no keys.
pub fn read_ignore_file<P: AsRef<Path>>(template_dir: P) -> Result<BTreeSet<String>> {
    let path = template_dir.as_ref().join(PLACEHOLDER_IGNORE_FILE);
    let mut keys = BTreeSet::new();
    if !path.exists() {
        debug!("{PLACEHOLDER_IGNORE_FILE} does not exist");
        return Ok(keys);
    }
    for line in fs::read_to_string(&path)?.lines() {
        let key = line.split('#').next().unwrap_or_default().trim();
        if !key.is_empty() {
            keys.insert(key.to_string());
        }
    }
    Ok(keys)
}

/// Reads the text of a tree entry for scanning, following symlinks.
///
/// Returns `None` for binary files, broken links and unreadable content.
fn read_text_entry(path: &Path, kind: EntryKind) -> Option<String> {
    if kind == EntryKind::Symlink && fs::metadata(path).map(|m| !m.is_file()).unwrap_or(true) {
        return None;
    }
    if !is_text(path) {
        return None;
    }
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            debug!("Skipping unreadable '{}': {}", path.display(), e);
            None
        }
    }
}

/// Every placeholder token in the text files of `tree`, in walk order.
///
/// The confidence filter is not applied here; callers filter as needed.
pub fn scan_occurrences<P: AsRef<Path>>(tree: P) -> Result<Vec<Occurrence>> {
    let mut found = Vec::new();
    for entry in TreeWalk::new(tree).iter() {
        let entry = entry?;
        let Some(text) = read_text_entry(&entry.path, entry.kind) else {
            continue;
        };
        for (index, line) in text.lines().enumerate() {
            for caps in TOKEN.captures_iter(line) {
                found.push(Occurrence {
                    path: entry.path.clone(),
                    line: index + 1,
                    key: caps[1].to_string(),
                    raw: caps[0].to_string(),
                });
            }
        }
    }
    Ok(found)
}

/// Keys of all confident placeholders in `tree`, minus `ignore`.
pub fn find_placeholders<P: AsRef<Path>>(
    tree: P,
    ignore: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    Ok(scan_occurrences(tree)?
        .into_iter()
        .map(|o| o.key)
        .filter(|key| is_valid_placeholder(key) && !ignore.contains(key))
        .collect())
}
