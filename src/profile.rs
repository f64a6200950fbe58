//! Profile loading, validation and correction.
//!
//! A profile maps placeholder keys to real values. It is a line-oriented,
//! YAML-compatible file:
//!
//! ```yaml
//! COMPANY_NAME: ACME Corp      # shown in headers
//! INTERNAL_URL: "https://internal.acme.com"
//! ignore_placeholders: LEGACY_TOKEN, OLD_HOST
//! ```
//!
//! The file is parsed as YAML first. When that fails, or when a value is not
//! a scalar (an author pasting `KEY: {{ KEY }}` produces a YAML mapping),
//! a degraded line parser takes over.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexMap;
use log::{debug, info, warn};
use regex::Regex;

use crate::constants::{APPEND_SENTINEL, MAX_VALUE_LENGTH, PROFILE_IGNORE_KEY, SENTINEL_VALUES};
use crate::error::{Error, Result};
use crate::prompt::{allow_fix, FixPolicy, Prompter};

static WRAPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{\s*(.*?)\s*\}\}$").unwrap());

/// Loaded profile: ordered key/value pairs plus keys exempt from checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    path: Option<PathBuf>,
    values: IndexMap<String, String>,
    lines: IndexMap<String, usize>,
    ignored: BTreeSet<String>,
}

impl Profile {
    /// Builds an in-memory profile, mostly useful for callers that already
    /// hold the mapping.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { values, ..Default::default() }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 1-based line of `key` in the backing file.
    pub fn line_of(&self, key: &str) -> Option<usize> {
        self.lines.get(key).copied()
    }

    /// Keys listed under `ignore_placeholders`.
    pub fn ignored(&self) -> &BTreeSet<String> {
        &self.ignored
    }
}

/// One `KEY: value  # comment` line split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProfileLine {
    key: String,
    /// Value with surrounding quotes removed
    value: String,
    /// Byte range of the raw (possibly quoted) value in the line
    value_range: std::ops::Range<usize>,
}

/// Byte offset of a trailing `#` comment in `rest`, ignoring `#` inside quotes.
fn comment_start(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut previous: Option<char> = None;
    for (index, c) in rest.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' && previous.is_none_or(char::is_whitespace) => return Some(index),
            None => {}
        }
        previous = Some(c);
    }
    None
}

fn unquote(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

/// Parses one profile line. `Ok(None)` for blank and comment-only lines.
fn parse_line(line: &str) -> std::result::Result<Option<ProfileLine>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let Some(colon) = line.find(':') else {
        return Err("missing ':' between key and value".to_string());
    };
    let key = line[..colon].trim();
    if key.is_empty() {
        return Err("empty key".to_string());
    }
    let rest_start = colon + 1;
    let rest = &line[rest_start..];
    let rest_end = comment_start(rest).unwrap_or(rest.len());
    let raw_value = &rest[..rest_end];
    let leading = raw_value.len() - raw_value.trim_start().len();
    let raw_trimmed = raw_value.trim();
    let start = rest_start + leading;
    Ok(Some(ProfileLine {
        key: key.to_string(),
        value: unquote(raw_trimmed).to_string(),
        value_range: start..start + raw_trimmed.len(),
    }))
}

fn split_ignore_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .map(|s| unquote(s.trim()).to_string())
        .filter(|s| !s.is_empty())
}

/// Inner text of a value that is entirely a placeholder token.
pub fn wrapped_placeholder(value: &str) -> Option<&str> {
    WRAPPED.captures(value.trim()).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn syntax_error(path: &Path, line: usize, message: impl Into<String>) -> Error {
    Error::ProfileSyntaxError {
        path: path.display().to_string(),
        line,
        message: message.into(),
    }
}

/// Line-oriented fallback parser.
fn parse_degraded(path: &Path, content: &str) -> Result<Profile> {
    let mut profile = Profile { path: Some(path.to_path_buf()), ..Default::default() };
    let mut in_ignore_list = false;
    for (index, line) in content.lines().enumerate() {
        let number = index + 1;
        let trimmed = line.trim();
        if in_ignore_list {
            if let Some(item) = trimmed.strip_prefix("- ") {
                let item = item.split('#').next().unwrap_or_default().trim();
                profile.ignored.insert(unquote(item).to_string());
                continue;
            }
            if !trimmed.is_empty() {
                in_ignore_list = false;
            }
        }
        let parsed = parse_line(line).map_err(|message| syntax_error(path, number, message))?;
        let Some(parsed) = parsed else {
            continue;
        };
        if parsed.key == PROFILE_IGNORE_KEY {
            in_ignore_list = parsed.value.is_empty();
            profile.ignored.extend(split_ignore_list(&parsed.value));
            continue;
        }
        profile.lines.insert(parsed.key.clone(), number);
        profile.values.insert(parsed.key, parsed.value);
    }
    Ok(profile)
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

/// YAML parser. `Ok(None)` asks for the degraded parser.
///
/// Also returns the keys whose values were numbers or booleans; their text
/// is taken verbatim from the file so `1.10` does not become `1.1`.
fn parse_yaml(path: &Path, content: &str) -> Result<Option<(Profile, Vec<String>)>> {
    let document: serde_yaml::Value = match serde_yaml::from_str(content) {
        Ok(document) => document,
        Err(e) => {
            debug!("Profile '{}' is not valid YAML ({}), using line parser", path.display(), e);
            return Ok(None);
        }
    };
    let mapping = match document {
        serde_yaml::Value::Null => return Ok(Some((Profile::default(), Vec::new()))),
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => {
            debug!("Profile '{}' is not a YAML mapping, using line parser", path.display());
            return Ok(None);
        }
    };

    let mut profile = Profile::default();
    let mut coerced = Vec::new();
    for (key, value) in mapping {
        let key = match key {
            serde_yaml::Value::String(key) => key,
            other => {
                return Err(Error::ConfigError(format!(
                    "Profile '{}' has a non-string key: {:?}",
                    path.display(),
                    other
                )))
            }
        };
        if key == PROFILE_IGNORE_KEY {
            match &value {
                serde_yaml::Value::Sequence(items) => {
                    profile.ignored.extend(items.iter().filter_map(scalar_to_string))
                }
                other => {
                    if let Some(s) = scalar_to_string(other) {
                        profile.ignored.extend(split_ignore_list(&s));
                    }
                }
            }
            continue;
        }
        if matches!(value, serde_yaml::Value::Number(_) | serde_yaml::Value::Bool(_)) {
            coerced.push(key.clone());
        }
        match scalar_to_string(&value) {
            Some(s) => {
                profile.values.insert(key, s);
            }
            None => return Ok(None),
        }
    }
    Ok(Some((profile, coerced)))
}

/// Loads the profile at `path`.
///
/// With `strict` set, a value that is itself a placeholder token is a
/// [`Error::ProfileSyntaxError`]; otherwise it is left for
/// [`validate_profile_values`] to report as fixable.
pub fn load_profile<P: AsRef<Path>>(path: P, strict: bool) -> Result<Profile> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::ConfigError(format!(
            "Profile '{}' does not exist",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    let mut profile = match parse_yaml(path, &content)? {
        Some((mut profile, coerced)) => {
            if !coerced.is_empty() {
                if let Ok(raw) = parse_degraded(path, &content) {
                    for key in coerced {
                        if let Some(text) = raw.values.get(&key) {
                            profile.values.insert(key, text.clone());
                        }
                    }
                }
            }
            profile
        }
        None => parse_degraded(path, &content)?,
    };
    profile.path = Some(path.to_path_buf());

    // Line numbers always come from the text so diagnostics can cite them.
    for (index, line) in content.lines().enumerate() {
        if let Ok(Some(parsed)) = parse_line(line) {
            if profile.values.contains_key(&parsed.key) {
                profile.lines.entry(parsed.key).or_insert(index + 1);
            }
        }
    }

    if strict {
        for (key, value) in &profile.values {
            if wrapped_placeholder(value).is_some() {
                let line = profile.line_of(key).unwrap_or(0);
                return Err(syntax_error(
                    path,
                    line,
                    format!("value of '{key}' is a placeholder token, not a real value"),
                ));
            }
        }
    }

    debug!("Loaded {} profile value(s) from '{}'", profile.len(), path.display());
    Ok(profile)
}

/// A profile value that can be corrected automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFix {
    pub key: String,
    /// 1-based line in the profile file
    pub line: usize,
    pub current: String,
    pub replacement: String,
}

impl std::fmt::Display for ProfileFix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: '{}' is set to the placeholder '{}' instead of a value",
            self.line, self.key, self.current
        )
    }
}

/// Outcome of [`validate_profile_values`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileReport {
    pub warnings: Vec<String>,
    pub fixable: Vec<ProfileFix>,
}

/// Flags suspicious values (warnings) and placeholder-as-value mistakes (fixable).
pub fn validate_profile_values(profile: &Profile) -> ProfileReport {
    let mut report = ProfileReport::default();
    for (key, value) in profile.iter() {
        let line = profile.line_of(key).unwrap_or(0);
        let at = format!("{key} (line {line})");
        let trimmed = value.trim();
        if trimmed.is_empty() {
            report.warnings.push(format!("{at}: empty value"));
        } else if SENTINEL_VALUES.iter().any(|s| trimmed.eq_ignore_ascii_case(s)) {
            report.warnings.push(format!("{at}: value is still '{trimmed}'"));
        }
        if value.chars().count() > MAX_VALUE_LENGTH {
            report.warnings.push(format!("{at}: value is longer than {MAX_VALUE_LENGTH} characters"));
        }
        if value.contains('\n') || value.contains('\r') {
            report.warnings.push(format!("{at}: value contains a newline"));
        }
        if let Some(inner) = wrapped_placeholder(value) {
            report.fixable.push(ProfileFix {
                key: key.to_string(),
                line,
                current: value.to_string(),
                replacement: inner.to_string(),
            });
        }
    }
    report
}

fn quote_like(original_raw: &str, replacement: &str) -> String {
    match original_raw.chars().next() {
        Some(q @ ('"' | '\'')) if original_raw.ends_with(q) && original_raw.len() >= 2 => {
            format!("{q}{replacement}{q}")
        }
        _ => replacement.to_string(),
    }
}

/// Rewrites the lines named by `fixes` in the profile file at `path`.
///
/// Only the value part of each line changes; keys, quoting style and
/// trailing comments are preserved. Line endings are kept as found.
pub fn apply_fixes<P: AsRef<Path>>(path: P, fixes: &[ProfileFix]) -> Result<()> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let mut out = String::with_capacity(content.len());
    for (index, segment) in content.split_inclusive('\n').enumerate() {
        let number = index + 1;
        let Some(fix) = fixes.iter().find(|f| f.line == number) else {
            out.push_str(segment);
            continue;
        };
        let body = segment.trim_end_matches(['\n', '\r']);
        let ending = &segment[body.len()..];
        match parse_line(body) {
            Ok(Some(parsed)) if parsed.key == fix.key => {
                let raw = &body[parsed.value_range.clone()];
                out.push_str(&body[..parsed.value_range.start]);
                out.push_str(&quote_like(raw, &fix.replacement));
                out.push_str(&body[parsed.value_range.end..]);
                out.push_str(ending);
                info!("Fixed profile value '{}' at line {}", fix.key, number);
            }
            _ => {
                return Err(syntax_error(
                    path,
                    number,
                    format!("expected the definition of '{}' here", fix.key),
                ))
            }
        }
    }
    fs::write(path, out)?;
    Ok(())
}

/// Applies the fixes permitted by `policy` and returns the ones left unresolved.
pub fn resolve_fixes<P: AsRef<Path>>(
    path: P,
    fixes: &[ProfileFix],
    policy: FixPolicy,
    prompter: &dyn Prompter,
) -> Result<Vec<ProfileFix>> {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for fix in fixes {
        let prompt = format!(
            "Profile value for '{}' at line {} is '{}'. Replace it with '{}'?",
            fix.key, fix.line, fix.current, fix.replacement
        );
        if allow_fix(policy, prompter, prompt)? {
            accepted.push(fix.clone());
        } else {
            rejected.push(fix.clone());
        }
    }
    if !accepted.is_empty() {
        apply_fixes(path, &accepted)?;
    }
    Ok(rejected)
}

/// Appends `KEY: TODO` for every key in `keys` to the profile at `path`.
pub fn append_missing_keys<P: AsRef<Path>>(path: P, keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let path = path.as_ref();
    let mut content = fs::read_to_string(path).unwrap_or_default();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for key in keys {
        warn!("Appending missing key '{}' to '{}'", key, path.display());
        content.push_str(&format!("{key}: {APPEND_SENTINEL}\n"));
    }
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let parsed = parse_line("KEY: 'a # b'  # note").unwrap().unwrap();
        assert_eq!(parsed.key, "KEY");
        assert_eq!(parsed.value, "a # b");

        let parsed = parse_line("URL: http://x.y/#frag").unwrap().unwrap();
        assert_eq!(parsed.value, "http://x.y/#frag");

        assert_eq!(parse_line("   # only a comment").unwrap(), None);
        assert_eq!(parse_line("").unwrap(), None);
        assert!(parse_line("no separator here").is_err());
        assert!(parse_line(": value").is_err());
    }

    #[test]
    fn test_wrapped_placeholder() {
        assert_eq!(wrapped_placeholder("{{ bad }}"), Some("bad"));
        assert_eq!(wrapped_placeholder("{{bad}}"), Some("bad"));
        assert_eq!(wrapped_placeholder("x {{bad}}"), None);
        assert_eq!(wrapped_placeholder("plain"), None);
    }

    #[test]
    fn test_validate_profile_values() {
        let profile = Profile::from_pairs([
            ("EMPTY_ONE", ""),
            ("LATER", "TODO"),
            ("LONG", &"x".repeat(301)[..]),
            ("MULTI", "a\nb"),
            ("PASTED", "{{ PASTED }}"),
            ("GOOD", "fine"),
        ]);
        let report = validate_profile_values(&profile);
        assert_eq!(report.warnings.len(), 4);
        assert_eq!(report.fixable.len(), 1);
        assert_eq!(report.fixable[0].replacement, "PASTED");
    }
}
