//! Keyword scrubbing for exports and the leak scan run over them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, info};
use regex::{Regex, RegexBuilder};

use crate::classify::is_text;
use crate::error::{Error, Result};
use crate::tree::{copy_entry, EntryKind, TreeWalk};

/// True if `line` contains any keyword, compared case-sensitively.
pub fn should_filter_line(line: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|kw| !kw.is_empty() && line.contains(kw.as_str()))
}

/// Drops every line containing a keyword, ignoring case.
pub fn clean_lines<'a, I>(lines: I, keywords: &[String]) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let lowered: Vec<String> =
        keywords.iter().filter(|kw| !kw.is_empty()).map(|kw| kw.to_lowercase()).collect();
    lines
        .into_iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            !lowered.iter().any(|kw| lower.contains(kw.as_str()))
        })
        .collect()
}

/// Copies `src` into a fresh `dst`, removing keyword lines from text files.
///
/// Returns the relative paths of the files that lost at least one line.
pub fn export_directory<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dst: Q,
    keywords: &[String],
) -> Result<Vec<PathBuf>> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    if !src.is_dir() {
        return Err(Error::SourceDoesNotExistError { source_dir: src.display().to_string() });
    }
    if dst.exists() {
        return Err(Error::DestinationExistsError { dest: dst.display().to_string() });
    }
    fs::create_dir_all(dst)?;

    let mut cleaned = Vec::new();
    for entry in TreeWalk::new(src).iter() {
        let entry = entry?;
        let target = dst.join(&entry.relative);
        if entry.kind == EntryKind::Symlink || !is_text(&entry.path) {
            copy_entry(&entry.path, entry.kind, &target)?;
            continue;
        }

        let bytes = fs::read(&entry.path).map_err(|e| Error::substitution(&entry.path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        let mut output = String::with_capacity(content.len());
        let mut dropped = 0;
        for line in content.split_inclusive('\n') {
            if should_filter_line(line, keywords) {
                dropped += 1;
            } else {
                output.push_str(line);
            }
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::substitution(parent, e))?;
        }
        if dropped == 0 {
            fs::write(&target, &bytes).map_err(|e| Error::substitution(&target, e))?;
        } else {
            debug!("Dropped {} keyword line(s) from '{}'", dropped, entry.relative.display());
            fs::write(&target, output).map_err(|e| Error::substitution(&target, e))?;
            cleaned.push(entry.relative);
        }
    }

    info!("Exported '{}' to '{}' ({} file(s) scrubbed)", src.display(), dst.display(), cleaned.len());
    Ok(cleaned)
}

/// One suspicious line found by [`scan_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakFinding {
    pub path: PathBuf,
    pub line: usize,
    pub kind: &'static str,
    pub text: String,
}

impl std::fmt::Display for LeakFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {} -> {}", self.path.display(), self.line, self.kind, self.text)
    }
}

fn insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern).case_insensitive(true).build().unwrap()
}

static LEAK_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let mut patterns = vec![
        (insensitive(r"[\w.-]+@[\w.-]+\.\w+"), "Email"),
        (Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap(), "IP address"),
    ];
    for token in [
        r"api[_-]?key\s*=\s*\S+",
        r"secret\s*=\s*\S+",
        r"password\s*[=:]\s*\S+",
        r"aws_secret_access_key\s*=\s*\S+",
        r"-----BEGIN(?: [A-Z]+)? PRIVATE KEY-----",
        r"ssh-rsa\s+[A-Za-z0-9+/]+",
    ] {
        patterns.push((insensitive(token), "Token"));
    }
    patterns
});

/// Scans every text file under `dir` for keywords and secret-looking content.
pub fn scan_directory<P: AsRef<Path>>(dir: P, keywords: &[String]) -> Result<Vec<LeakFinding>> {
    let keyword_patterns = keywords
        .iter()
        .filter(|kw| !kw.is_empty())
        .map(|kw| {
            RegexBuilder::new(&regex::escape(kw))
                .case_insensitive(true)
                .build()
                .map(|re| (re, "Company reference"))
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::ConfigError(format!("invalid keyword: {e}")))?;

    let mut findings = Vec::new();
    for entry in TreeWalk::new(dir.as_ref()).iter() {
        let entry = entry?;
        if entry.kind == EntryKind::Symlink || !is_text(&entry.path) {
            continue;
        }
        let bytes = fs::read(&entry.path).map_err(|e| Error::substitution(&entry.path, e))?;
        let content = String::from_utf8_lossy(&bytes);
        for (index, line) in content.lines().enumerate() {
            for (regex, kind) in keyword_patterns.iter().chain(LEAK_PATTERNS.iter()) {
                if regex.is_match(line) {
                    findings.push(LeakFinding {
                        path: entry.relative.clone(),
                        line: index + 1,
                        kind: *kind,
                        text: line.trim().to_string(),
                    });
                }
            }
        }
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec!["YourCompany".to_string(), "@company.com".to_string()]
    }

    #[test]
    fn test_should_filter_line_is_case_sensitive() {
        assert!(should_filter_line("by YourCompany", &keywords()));
        assert!(!should_filter_line("by yourcompany", &keywords()));
        assert!(!should_filter_line("plain", &keywords()));
    }

    #[test]
    fn test_clean_lines_ignores_case() {
        let lines = ["keep", "mail ops@COMPANY.COM", "also keep"];
        assert_eq!(clean_lines(lines, &keywords()), vec!["keep", "also keep"]);
    }
}
