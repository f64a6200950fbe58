//! Identifier sanitization for placeholders in declaration positions.
//!
//! [`sanitize`] is a one-way, lossy mapping: distinct values can collapse to
//! the same identifier ("ACME Corp" and "ACME_Corp" both give `ACME_Corp`).
//! Nothing here tries to invert it.

use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{FALLBACK_IDENTIFIER, RESERVED_PREFIX, RESERVED_WORDS, SOURCE_EXTENSIONS};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").unwrap());
static REPEATED_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:async\s+)?(?:class|def)\s+((?:[A-Za-z0-9_]|\{\{\s*[A-Za-z0-9_]+\s*\}\})+)",
    )
    .unwrap()
});

/// How a sanitized identifier was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sanitized {
    /// The value's own characters formed the identifier.
    Clean(String),
    /// The cleaned value was a reserved word and got prefixed.
    Prefixed(String),
    /// Nothing usable was left; the fixed fallback name was used.
    Fallback,
}

impl Sanitized {
    pub fn identifier(&self) -> &str {
        match self {
            Sanitized::Clean(s) | Sanitized::Prefixed(s) => s,
            Sanitized::Fallback => FALLBACK_IDENTIFIER,
        }
    }
}

/// Sanitizes `value` and reports how the result was produced.
pub fn sanitize_detailed(value: &str) -> Sanitized {
    let replaced = NON_WORD.replace_all(value, "_");
    let without_digits = replaced.trim_start_matches(|c: char| c.is_ascii_digit());
    let collapsed = REPEATED_UNDERSCORE.replace_all(without_digits, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        Sanitized::Fallback
    } else if RESERVED_WORDS.contains(&trimmed) {
        Sanitized::Prefixed(format!("{RESERVED_PREFIX}{trimmed}"))
    } else {
        Sanitized::Clean(trimmed.to_string())
    }
}

/// Maps an arbitrary profile value to a bare identifier.
///
/// Runs of non-word characters become one underscore, leading digits are
/// stripped, repeated underscores collapse and outer underscores are
/// trimmed. Reserved words get the `var_` prefix; an empty result becomes
/// `unnamed`.
pub fn sanitize(value: &str) -> String {
    sanitize_detailed(value).identifier().to_string()
}

/// True when `value` survives sanitization without prefixing or fallback.
pub fn is_identifier_compatible(value: &str) -> bool {
    matches!(sanitize_detailed(value), Sanitized::Clean(_))
}

/// True for files whose declarations receive identifier-safe substitution.
pub fn is_source_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Byte range of the declared name on a `class`/`def` line, if any.
///
/// The name may contain placeholder tokens, so `class {{ ORG }}Client:`
/// yields the range covering `{{ ORG }}Client`.
pub fn declaration_name_span(line: &str) -> Option<Range<usize>> {
    DECLARATION.captures(line).and_then(|caps| caps.get(1)).map(|m| m.range())
}
