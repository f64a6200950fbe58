//! Reversion engine: concrete tree back to placeholder form.
//!
//! Values are replaced by `{{ KEY }}` tokens, longest value first, so a value
//! contained in a longer one is never consumed ahead of it. Two matching
//! modes exist:
//!
//! * exact: an occurrence must have a non-word character on both sides.
//!   Occurrences at the very start of a line, or touching a letter, digit or
//!   underscore, are left alone. Missed matches are preferred over wrong ones.
//! * smart (default): each occurrence is judged on its own. One not touching
//!   word characters is replaced. One with alphanumeric characters on both
//!   sides sits inside an identifier and is refused as ambiguous. Any other
//!   occurrence is replaced and counted as a smart match.
//!
//! Smart mode also recognises the sanitized identifier form of a value
//! inside the declared name of a `class`/`def` line, as long as no other
//! value sanitizes to the same identifier. This is a heuristic, not an
//! inverse of sanitization.

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::classify::is_text;
use crate::constants::OVERLAY_MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::identifier::{declaration_name_span, is_source_file, sanitize_detailed, Sanitized};
use crate::placeholder::{token, TOKEN};
use crate::profile::Profile;
use crate::tree::{copy_tree, EntryKind, TreeWalk};

/// What to do with occurrences refused by smart matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    /// Log a warning, skip the occurrence and carry on.
    #[default]
    Warn,
    /// Finish the walk, then fail listing every refused occurrence.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RevertOptions {
    pub exact: bool,
    pub on_ambiguous: AmbiguityPolicy,
}

/// An occurrence smart matching refused to replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousMatch {
    pub path: PathBuf,
    pub line: usize,
    pub keys: Vec<String>,
    pub value: String,
}

impl std::fmt::Display for AmbiguousMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: '{}' ({}) sits inside an identifier",
            self.path.display(),
            self.line,
            self.value,
            self.keys.join(", ")
        )
    }
}

/// Summary of a [`revert`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertReport {
    pub files_rewritten: Vec<PathBuf>,
    pub replacements: usize,
    pub smart_matches: usize,
    pub ambiguous: Vec<AmbiguousMatch>,
    pub binary_skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Form {
    Literal,
    /// Sanitized form of the value, usable in declarations only
    Identifier,
    /// Sanitized form shared by several values; never replaced
    AmbiguousIdentifier(Vec<String>),
}

#[derive(Debug, Clone)]
struct Candidate {
    key: String,
    needle: String,
    form: Form,
}

/// Per-line outcome of [`Reverter::revert_line`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineResult {
    pub text: String,
    pub replaced: Vec<String>,
    pub smart: usize,
    /// `(keys, value)` pairs refused as ambiguous
    pub refused: Vec<(Vec<String>, String)>,
}

/// A line being reverted, with the byte ranges of tokens that must not be
/// matched again.
struct LineBuffer {
    text: String,
    protected: Vec<Range<usize>>,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl LineBuffer {
    fn new(line: &str) -> Self {
        let protected = TOKEN.find_iter(line).map(|m| m.range()).collect();
        Self { text: line.to_string(), protected }
    }

    fn occurrences(&self, needle: &str) -> Vec<usize> {
        self.text
            .match_indices(needle)
            .map(|(start, _)| start)
            .filter(|&start| {
                let end = start + needle.len();
                !self.protected.iter().any(|r| start < r.end && r.start < end)
            })
            .collect()
    }

    fn neighbours(&self, start: usize, len: usize) -> (Option<char>, Option<char>) {
        (self.text[..start].chars().next_back(), self.text[start + len..].chars().next())
    }

    /// Replaces the given occurrences (ascending starts) of a `len`-byte needle.
    fn replace(&mut self, starts: &[usize], len: usize, replacement: &str) {
        for &start in starts.iter().rev() {
            self.text.replace_range(start..start + len, replacement);
            let delta = replacement.len() as isize - len as isize;
            for range in self.protected.iter_mut().filter(|r| r.start >= start + len) {
                range.start = (range.start as isize + delta) as usize;
                range.end = (range.end as isize + delta) as usize;
            }
            self.protected.push(start..start + replacement.len());
        }
    }
}

/// Reverts lines and files for one profile.
pub struct Reverter {
    candidates: Vec<Candidate>,
    exact: bool,
}

impl Reverter {
    pub fn new(profile: &Profile, options: RevertOptions) -> Self {
        let mut candidates: Vec<Candidate> = profile
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| Candidate {
                key: key.to_string(),
                needle: value.to_string(),
                form: Form::Literal,
            })
            .collect();

        if !options.exact {
            let mut by_identifier: HashMap<String, Vec<String>> = HashMap::new();
            let mut sanitized = Vec::new();
            for (key, value) in profile.iter() {
                if let Sanitized::Clean(id) | Sanitized::Prefixed(id) = sanitize_detailed(value) {
                    by_identifier.entry(id.clone()).or_default().push(key.to_string());
                    if id != value {
                        sanitized.push((key.to_string(), id));
                    }
                }
            }
            for (key, id) in sanitized {
                let owners = &by_identifier[&id];
                let form = if owners.len() == 1 {
                    Form::Identifier
                } else {
                    Form::AmbiguousIdentifier(owners.clone())
                };
                candidates.push(Candidate { key, needle: id, form });
            }
        }

        // Stable: literals keep profile order and precede identifier forms of equal length.
        candidates.sort_by(|a, b| b.needle.chars().count().cmp(&a.needle.chars().count()));
        Self { candidates, exact: options.exact }
    }

    /// Reverts one line. `source` enables declaration-aware matching.
    pub fn revert_line(&self, line: &str, source: bool) -> LineResult {
        let mut buffer = LineBuffer::new(line);
        let mut result = LineResult::default();

        for candidate in &self.candidates {
            let len = candidate.needle.len();
            let replacement = token(&candidate.key);
            match &candidate.form {
                Form::Literal if self.exact => {
                    let starts: Vec<usize> = buffer
                        .occurrences(&candidate.needle)
                        .into_iter()
                        .filter(|&start| {
                            let (before, after) = buffer.neighbours(start, len);
                            before.is_some_and(|c| !is_word(c)) && after.is_some_and(|c| !is_word(c))
                        })
                        .collect();
                    if !starts.is_empty() {
                        buffer.replace(&starts, len, &replacement);
                        result.replaced.extend(starts.iter().map(|_| candidate.key.clone()));
                    }
                }
                Form::Literal => {
                    let mut accepted = Vec::new();
                    let mut smart = 0;
                    for start in buffer.occurrences(&candidate.needle) {
                        let (before, after) = buffer.neighbours(start, len);
                        if !before.is_some_and(is_word) && !after.is_some_and(is_word) {
                            accepted.push(start);
                        } else if before.is_some_and(char::is_alphanumeric)
                            && after.is_some_and(char::is_alphanumeric)
                        {
                            result.refused.push((vec![candidate.key.clone()], candidate.needle.clone()));
                        } else {
                            accepted.push(start);
                            smart += 1;
                        }
                    }
                    if !accepted.is_empty() {
                        buffer.replace(&accepted, len, &replacement);
                        result.smart += smart;
                        result.replaced.extend(accepted.iter().map(|_| candidate.key.clone()));
                    }
                }
                Form::Identifier | Form::AmbiguousIdentifier(_) => {
                    if !source {
                        continue;
                    }
                    let Some(span) = declaration_name_span(&buffer.text) else {
                        continue;
                    };
                    let inside: Vec<usize> = buffer
                        .occurrences(&candidate.needle)
                        .into_iter()
                        .filter(|&start| span.start <= start && start + len <= span.end)
                        .collect();
                    if inside.is_empty() {
                        continue;
                    }
                    if let Form::AmbiguousIdentifier(owners) = &candidate.form {
                        result.refused.push((owners.clone(), candidate.needle.clone()));
                        continue;
                    }
                    let mut accepted = Vec::new();
                    for start in inside {
                        let (before, after) = buffer.neighbours(start, len);
                        if before.is_some_and(char::is_alphanumeric)
                            && after.is_some_and(char::is_alphanumeric)
                        {
                            result.refused.push((vec![candidate.key.clone()], candidate.needle.clone()));
                        } else {
                            accepted.push(start);
                        }
                    }
                    if !accepted.is_empty() {
                        buffer.replace(&accepted, len, &replacement);
                        result.smart += accepted.len();
                        result.replaced.extend(accepted.iter().map(|_| candidate.key.clone()));
                    }
                }
            }
        }

        result.text = buffer.text;
        result
    }

    /// Reverts the file at `path` in place, recording refusals in `report`.
    pub fn revert_file(&self, path: &Path, report: &mut RevertReport) -> Result<bool> {
        if !is_text(path) {
            info!("Skipping binary file '{}'", path.display());
            report.binary_skipped.push(path.to_path_buf());
            return Ok(false);
        }
        let content = fs::read_to_string(path).map_err(|e| Error::substitution(path, e))?;
        let source = is_source_file(path);
        let mut output = String::with_capacity(content.len());
        let mut changed = false;

        for (index, line) in content.split_inclusive('\n').enumerate() {
            let number = index + 1;
            let result = self.revert_line(line, source);
            for key in &result.replaced {
                debug!("{}:{} {} -> {}", path.display(), number, key, token(key));
            }
            if result.smart > 0 {
                info!("{}:{} {} smart match(es)", path.display(), number, result.smart);
            }
            for (keys, value) in result.refused {
                let ambiguous = AmbiguousMatch { path: path.to_path_buf(), line: number, keys, value };
                warn!("Ambiguous match skipped: {ambiguous}");
                report.ambiguous.push(ambiguous);
            }
            report.replacements += result.replaced.len();
            report.smart_matches += result.smart;
            changed |= !result.replaced.is_empty();
            output.push_str(&result.text);
        }

        if changed {
            fs::write(path, output).map_err(|e| Error::substitution(path, e))?;
        }
        Ok(changed)
    }
}

/// Reverts every file of an existing tree in place.
pub fn revert_tree<P: AsRef<Path>>(
    root: P,
    profile: &Profile,
    options: RevertOptions,
) -> Result<RevertReport> {
    let reverter = Reverter::new(profile, options);
    let mut report = RevertReport::default();
    let walk = TreeWalk::new(root.as_ref()).skip(OVERLAY_MANIFEST_FILE);
    for entry in walk.iter() {
        let entry = entry?;
        if entry.kind == EntryKind::Symlink {
            continue;
        }
        if reverter.revert_file(&entry.path, &mut report)? {
            report.files_rewritten.push(entry.relative);
        }
    }

    if options.on_ambiguous == AmbiguityPolicy::Error && !report.ambiguous.is_empty() {
        return Err(Error::AmbiguousMatchError {
            matches: report.ambiguous.iter().map(ToString::to_string).collect(),
        });
    }
    Ok(report)
}

/// Copies `concrete` to a fresh `dest` and reverts values to placeholders there.
///
/// # Errors
/// * `Error::DestinationExistsError` if `dest` already exists
/// * `Error::SubstitutionIoError` for any I/O failure while transforming
/// * `Error::AmbiguousMatchError` when the policy is `Error` and matches were refused
pub fn revert<P: AsRef<Path>, Q: AsRef<Path>>(
    concrete: P,
    dest: Q,
    profile: &Profile,
    options: RevertOptions,
) -> Result<RevertReport> {
    let dest = dest.as_ref();
    copy_tree(concrete.as_ref(), dest)?;
    let report = revert_tree(dest, profile, options)?;
    info!(
        "Reverted {} value(s) in {} file(s) under '{}' ({} smart, {} ambiguous skipped)",
        report.replacements,
        report.files_rewritten.len(),
        dest.display(),
        report.smart_matches,
        report.ambiguous.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smart() -> RevertOptions {
        RevertOptions::default()
    }

    fn exact() -> RevertOptions {
        RevertOptions { exact: true, ..Default::default() }
    }

    #[test]
    fn test_bounded_match_replaced_partial_word_refused() {
        let profile = Profile::from_pairs([("USER", "admin")]);
        let reverter = Reverter::new(&profile, smart());
        let result = reverter.revert_line("admin badmington\n", false);
        assert_eq!(result.text, "{{ USER }} badmington\n");
        assert_eq!(result.smart, 0);
        assert_eq!(result.refused, vec![(vec!["USER".to_string()], "admin".to_string())]);
    }

    #[test]
    fn test_each_occurrence_judged_alone() {
        let profile = Profile::from_pairs([("USER", "admin")]);
        let reverter = Reverter::new(&profile, smart());
        let result = reverter.revert_line("user=admin dir=/home/admin_data\n", false);
        assert_eq!(result.text, "user={{ USER }} dir=/home/{{ USER }}_data\n");
        assert_eq!(result.replaced.len(), 2);
        assert_eq!(result.smart, 1);
    }

    #[test]
    fn test_exact_requires_non_word_neighbours() {
        let profile = Profile::from_pairs([("USER", "admin")]);
        let reverter = Reverter::new(&profile, exact());
        assert_eq!(reverter.revert_line("admin badmington\n", false).text, "admin badmington\n");
        assert_eq!(reverter.revert_line("user=admin\n", false).text, "user={{ USER }}\n");
    }

    #[test]
    fn test_smart_match_and_refusal() {
        let profile = Profile::from_pairs([("COMPANY_NAME", "ACME Corp")]);
        let reverter = Reverter::new(&profile, smart());

        let result = reverter.revert_line("ACME CorpClient", false);
        assert_eq!(result.text, "{{ COMPANY_NAME }}Client");
        assert_eq!(result.smart, 1);

        let result = reverter.revert_line("NewACME CorpClient", false);
        assert_eq!(result.text, "NewACME CorpClient");
        assert_eq!(result.refused.len(), 1);
    }

    #[test]
    fn test_longest_value_first() {
        let profile = Profile::from_pairs([
            ("PROTO", "https"),
            ("COMPANY_DOMAIN", "acme.com"),
            ("INTERNAL_URL", "https://internal.acme.com"),
            ("API_VERSION", "v2"),
        ]);
        let reverter = Reverter::new(&profile, smart());
        let result = reverter.revert_line("API_URL = \"https://internal.acme.com/v2\"\n", false);
        assert_eq!(result.text, "API_URL = \"{{ INTERNAL_URL }}/{{ API_VERSION }}\"\n");
    }

    #[test]
    fn test_inserted_tokens_are_not_rematched() {
        let profile = Profile::from_pairs([("HOST", "db.internal"), ("SUFFIX", "URL")]);
        let reverter = Reverter::new(&profile, smart());
        let result = reverter.revert_line("{{ INTERNAL_URL }} db.internal\n", false);
        assert_eq!(result.text, "{{ INTERNAL_URL }} {{ HOST }}\n");
    }

    #[test]
    fn test_declaration_identifier_form() {
        let profile = Profile::from_pairs([("COMPANY_NAME", "ACME Corp"), ("FUNC_NAME", "run job")]);
        let reverter = Reverter::new(&profile, smart());
        assert_eq!(
            reverter.revert_line("class ACME_CorpClient:\n", true).text,
            "class {{ COMPANY_NAME }}Client:\n"
        );
        assert_eq!(
            reverter.revert_line("    def run_job(self):\n", true).text,
            "    def {{ FUNC_NAME }}(self):\n"
        );
        // Outside a declaration the identifier form is plain text.
        assert_eq!(reverter.revert_line("x = ACME_Corp\n", true).text, "x = ACME_Corp\n");
    }

    #[test]
    fn test_shared_identifier_form_is_refused() {
        let profile = Profile::from_pairs([("ORG_A", "ACME Corp"), ("ORG_B", "ACME-Corp")]);
        let reverter = Reverter::new(&profile, smart());
        let result = reverter.revert_line("class ACME_CorpClient:\n", true);
        assert_eq!(result.text, "class ACME_CorpClient:\n");
        assert_eq!(result.refused.len(), 2);
    }
}
