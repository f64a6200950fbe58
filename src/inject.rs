//! Substitution engine: template tree to concrete tree.
//!
//! The template is copied to a fresh destination, the optional overlay is
//! layered on top, and every placeholder with a profile entry is replaced by
//! its value. Substitution is line-oriented, so a token never spans lines.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Captures;

use crate::classify::is_text;
use crate::constants::OVERLAY_MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::identifier::{declaration_name_span, is_source_file, sanitize};
use crate::overlay::{merge_overlay, write_manifest, OverlayMerge};
use crate::placeholder::TOKEN;
use crate::profile::Profile;
use crate::tree::{copy_tree, EntryKind, TreeWalk};

/// One replaced token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub line: usize,
    pub key: String,
    pub replacement: String,
    /// True when the sanitized identifier form was used
    pub identifier: bool,
}

/// Outcome of transforming one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Rewritten(Vec<Substitution>),
    Unchanged,
    SkippedBinary,
}

/// Summary of an [`inject`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectReport {
    pub files_rewritten: Vec<PathBuf>,
    pub substitutions: usize,
    pub identifier_substitutions: usize,
    pub binary_skipped: Vec<PathBuf>,
    pub overlay: Option<OverlayMerge>,
}

/// Replaces the tokens of one line.
///
/// Tokens inside `identifier_span` (the declared name on a `class`/`def`
/// line) receive the sanitized identifier form of their value. Tokens
/// without a profile entry are left untouched.
pub fn substitute_line(
    line: &str,
    profile: &Profile,
    identifier_span: Option<Range<usize>>,
) -> (String, Vec<(String, String, bool)>) {
    let mut applied = Vec::new();
    let replaced = TOKEN.replace_all(line, |caps: &Captures| {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        let key = &caps[1];
        match profile.get(key) {
            Some(value) => {
                let in_declaration = identifier_span
                    .as_ref()
                    .is_some_and(|span| span.start <= whole.start && whole.end <= span.end);
                let replacement =
                    if in_declaration { sanitize(value) } else { value.to_string() };
                applied.push((key.to_string(), replacement.clone(), in_declaration));
                replacement
            }
            None => caps[0].to_string(),
        }
    });
    (replaced.into_owned(), applied)
}

/// Substitutes placeholders in the file at `path`, in place.
///
/// The file is rewritten only when at least one token was replaced.
pub fn inject_file<P: AsRef<Path>>(path: P, profile: &Profile) -> Result<FileOutcome> {
    let path = path.as_ref();
    if !is_text(path) {
        info!("Skipping binary file '{}'", path.display());
        return Ok(FileOutcome::SkippedBinary);
    }
    let content = fs::read_to_string(path).map_err(|e| Error::substitution(path, e))?;
    let source = is_source_file(path);

    let mut output = String::with_capacity(content.len());
    let mut substitutions = Vec::new();
    for (index, line) in content.split_inclusive('\n').enumerate() {
        let span = if source { declaration_name_span(line) } else { None };
        let (replaced, applied) = substitute_line(line, profile, span);
        for (key, replacement, identifier) in applied {
            if identifier {
                debug!(
                    "{}:{} {{{{ {} }}}} -> {} (identifier form)",
                    path.display(),
                    index + 1,
                    key,
                    replacement
                );
            } else {
                debug!("{}:{} {{{{ {} }}}} -> {}", path.display(), index + 1, key, replacement);
            }
            substitutions.push(Substitution { line: index + 1, key, replacement, identifier });
        }
        output.push_str(&replaced);
    }

    if substitutions.is_empty() {
        return Ok(FileOutcome::Unchanged);
    }
    fs::write(path, output).map_err(|e| Error::substitution(path, e))?;
    Ok(FileOutcome::Rewritten(substitutions))
}

/// Substitutes placeholders in every file of an existing tree.
pub fn inject_tree<P: AsRef<Path>>(root: P, profile: &Profile) -> Result<InjectReport> {
    let mut report = InjectReport::default();
    let walk = TreeWalk::new(root.as_ref()).skip(OVERLAY_MANIFEST_FILE);
    for entry in walk.iter() {
        let entry = entry?;
        if entry.kind == EntryKind::Symlink {
            debug!("Leaving symlink '{}' as is", entry.relative.display());
            continue;
        }
        match inject_file(&entry.path, profile)? {
            FileOutcome::Rewritten(subs) => {
                report.substitutions += subs.len();
                report.identifier_substitutions += subs.iter().filter(|s| s.identifier).count();
                report.files_rewritten.push(entry.relative);
            }
            FileOutcome::Unchanged => {}
            FileOutcome::SkippedBinary => report.binary_skipped.push(entry.relative),
        }
    }
    Ok(report)
}

/// Builds the concrete tree `dest` from `template`, `profile` and an optional overlay.
///
/// # Errors
/// * `Error::DestinationExistsError` if `dest` already exists
/// * `Error::SubstitutionIoError` for any I/O failure while transforming
pub fn inject<P: AsRef<Path>, Q: AsRef<Path>>(
    template: P,
    dest: Q,
    profile: &Profile,
    overlay: Option<&Path>,
) -> Result<InjectReport> {
    let dest = dest.as_ref();
    copy_tree(template.as_ref(), dest)?;

    let merge = match overlay {
        Some(overlay) => {
            let merge = merge_overlay(overlay, dest)?;
            write_manifest(overlay, dest)?;
            Some(merge)
        }
        None => None,
    };

    let mut report = inject_tree(dest, profile)?;
    report.overlay = merge;
    info!(
        "Injected {} value(s) into {} file(s) under '{}' ({} binary skipped)",
        report.substitutions,
        report.files_rewritten.len(),
        dest.display(),
        report.binary_skipped.len()
    );
    Ok(report)
}
