//! Pre-flight and post-flight validation.
//!
//! Both phases collect every problem they find instead of stopping at the
//! first one, so a single run tells the operator everything to fix.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use cruet::Inflector;
use globset::{GlobBuilder, GlobSetBuilder};
use log::{debug, error, info, warn};
use regex::Regex;

use crate::classify::is_text;
use crate::config::{load_config, WorkflowConfig};
use crate::error::{Error, Result};
use crate::identifier::{declaration_name_span, is_identifier_compatible, is_source_file};
use crate::placeholder::{
    is_valid_placeholder, read_ignore_file, scan_occurrences, token, Occurrence, TOKEN, TOKEN_BYTES,
};
use crate::profile::{
    append_missing_keys, load_profile, resolve_fixes, validate_profile_values, Profile,
};
use crate::prompt::{allow_fix, FixPolicy, Prompter};
use crate::scrub::{clean_lines, should_filter_line};
use crate::tree::{absolute, normalize, EntryKind, TreeWalk};
use crate::vcs::{self, VersionControl};

static NESTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{[^}]*\{\{").unwrap());

/// Errors and warnings from one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error<S: Into<String>>(&mut self, message: S) {
        self.errors.push(message.into());
    }

    fn warning<S: Into<String>>(&mut self, message: S) {
        self.warnings.push(message.into());
    }

    /// Logs every entry: errors at error level, warnings at warn level.
    pub fn log(&self) {
        for message in &self.errors {
            error!("{message}");
        }
        for message in &self.warnings {
            warn!("{message}");
        }
    }

    /// Turns a failed report into [`Error::ValidationError`].
    pub fn into_result(self) -> Result<Self> {
        if self.ok() {
            Ok(self)
        } else {
            Err(Error::ValidationError { errors: self.errors })
        }
    }
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn naming_style(key: &str) -> &'static str {
    if key.is_screaming_snake_case() {
        "SCREAMING_SNAKE_CASE"
    } else if key.is_pascal_case() {
        "PascalCase"
    } else if key.is_camel_case() {
        "camelCase"
    } else if key.is_snake_case() {
        "snake_case"
    } else {
        "irregular"
    }
}

/// Checks a workflow config file and everything it points at.
///
/// # Arguments
/// * `config_path` - Workflow config file
/// * `policy` - Whether fixable profile problems may be corrected in place
/// * `prompter` - Asked when `policy` is interactive
///
/// # Returns
/// * `Result<ValidationReport>` - Findings; I/O failures while scanning are errors
pub fn validate_before_workflow<P: AsRef<Path>>(
    config_path: P,
    policy: FixPolicy,
    prompter: &dyn Prompter,
) -> Result<ValidationReport> {
    let config = match load_config(config_path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            let mut report = ValidationReport::default();
            report.error(e.to_string());
            return Ok(report);
        }
    };
    let vcs = vcs::detect(&config.root);
    validate_config(&config, policy, prompter, vcs.as_ref())
}

/// Pre-flight checks for an already loaded config.
pub fn validate_config(
    config: &WorkflowConfig,
    policy: FixPolicy,
    prompter: &dyn Prompter,
    vcs: &dyn VersionControl,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    let template = config.template_dir();
    let profile_path = config.profile_path();

    if !template.is_dir() {
        report.error(format!("Template directory '{}' does not exist", template.display()));
    }
    if !profile_path.is_file() {
        report.error(format!("Profile '{}' does not exist", profile_path.display()));
    }
    if let Some(overlay) = config.overlay_path() {
        if !overlay.is_dir() {
            report.error(format!("Overlay directory '{}' does not exist", overlay.display()));
        }
    }
    check_layout(config, &mut report);
    if !report.ok() {
        return Ok(report);
    }

    let Some(profile) = check_profile(&profile_path, policy, prompter, &mut report)? else {
        return Ok(report);
    };

    let occurrences = scan_occurrences(&template)?;
    check_missing_keys(&template, &profile, &occurrences, policy, prompter, &mut report)?;
    check_naming_styles(&template, &profile, &occurrences, &mut report)?;
    check_template_contents(&template, &profile, &config.keywords, &mut report)?;
    check_sensitive_dirs(config, vcs, &mut report)?;

    info!(
        "Pre-flight validation: {} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    Ok(report)
}

/// Template, overlay and work dir must be distinct and not nested; the
/// profile must live outside the template and the work dir.
fn check_layout(config: &WorkflowConfig, report: &mut ValidationReport) {
    let mut dirs = vec![("template", absolute(&config.template_dir()))];
    if let Some(overlay) = config.overlay_path() {
        dirs.push(("overlay", absolute(&overlay)));
    }
    dirs.push(("work_dir", absolute(&config.work_path())));

    for (i, (name_a, a)) in dirs.iter().enumerate() {
        for (name_b, b) in &dirs[i + 1..] {
            if a == b {
                report.error(format!("{name_a} and {name_b} are the same directory '{}'", a.display()));
            } else if a.starts_with(b) || b.starts_with(a) {
                report.error(format!(
                    "{name_a} '{}' and {name_b} '{}' are nested",
                    a.display(),
                    b.display()
                ));
            }
        }
    }

    let profile = absolute(&config.profile_path());
    for (name, dir) in &dirs {
        if *name != "overlay" && profile.starts_with(dir) {
            report.error(format!("Profile '{}' lies inside {name}", profile.display()));
        }
    }
}

/// Loads the profile, reports suspicious values and resolves fixable ones.
fn check_profile(
    path: &Path,
    policy: FixPolicy,
    prompter: &dyn Prompter,
    report: &mut ValidationReport,
) -> Result<Option<Profile>> {
    let profile = match load_profile(path, false) {
        Ok(profile) => profile,
        Err(e) => {
            report.error(e.to_string());
            return Ok(None);
        }
    };
    let values = validate_profile_values(&profile);
    for warning in values.warnings {
        report.warning(format!("Profile {warning}"));
    }
    if values.fixable.is_empty() {
        return Ok(Some(profile));
    }

    let unresolved = resolve_fixes(path, &values.fixable, policy, prompter)?;
    for fix in &unresolved {
        report.error(format!("Profile {fix}"));
    }
    if unresolved.len() == values.fixable.len() {
        return Ok(Some(profile));
    }
    match load_profile(path, false) {
        Ok(profile) => Ok(Some(profile)),
        Err(e) => {
            report.error(e.to_string());
            Ok(None)
        }
    }
}

fn check_missing_keys(
    template: &Path,
    profile: &Profile,
    occurrences: &[Occurrence],
    policy: FixPolicy,
    prompter: &dyn Prompter,
    report: &mut ValidationReport,
) -> Result<()> {
    let mut ignored = read_ignore_file(template)?;
    ignored.extend(profile.ignored().iter().cloned());

    let mut missing: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for occurrence in occurrences {
        let key = occurrence.key.as_str();
        if is_valid_placeholder(key) && !ignored.contains(key) && !profile.contains_key(key) {
            missing.entry(key).or_default().push(format!(
                "{}:{}",
                display_relative(template, &occurrence.path),
                occurrence.line
            ));
        }
    }
    if missing.is_empty() {
        return Ok(());
    }

    let keys: Vec<String> = missing.keys().map(|k| k.to_string()).collect();
    let prompt = format!("Append {} missing key(s) to the profile as TODO: {}?", keys.len(), keys.join(", "));
    let append = allow_fix(policy, prompter, prompt)?;
    if append {
        let path = profile
            .path()
            .ok_or_else(|| Error::ConfigError("profile has no backing file".to_string()))?;
        append_missing_keys(path, &keys)?;
    }

    for (key, locations) in missing {
        let message = format!("Missing profile key '{key}' used at {}", locations.join(", "));
        if append {
            report.warning(format!("{message}; appended with value TODO"));
        } else {
            report.error(message);
        }
    }
    Ok(())
}

fn check_naming_styles(
    template: &Path,
    profile: &Profile,
    occurrences: &[Occurrence],
    report: &mut ValidationReport,
) -> Result<()> {
    let ignored = read_ignore_file(template)?;
    let keys: BTreeSet<&str> = occurrences
        .iter()
        .map(|o| o.key.as_str())
        .filter(|key| is_valid_placeholder(key) && !ignored.contains(*key))
        .filter(|key| !profile.ignored().contains(*key))
        .collect();

    let mut styles: BTreeMap<&'static str, Vec<&str>> = BTreeMap::new();
    for key in keys {
        styles.entry(naming_style(key)).or_default().push(key);
    }
    if styles.len() > 1 {
        let summary: Vec<String> = styles
            .iter()
            .map(|(style, keys)| format!("{style} ({})", keys.join(", ")))
            .collect();
        report.warning(format!("Mixed placeholder naming styles: {}", summary.join("; ")));
    }
    Ok(())
}

/// Per-file checks: binary placeholders, nesting, declarations and keywords.
fn check_template_contents(
    template: &Path,
    profile: &Profile,
    keywords: &[String],
    report: &mut ValidationReport,
) -> Result<()> {
    let lowered: Vec<(String, &String)> = keywords
        .iter()
        .filter(|kw| !kw.is_empty())
        .map(|kw| (kw.to_lowercase(), kw))
        .collect();

    for entry in TreeWalk::new(template).iter() {
        let entry = entry?;
        if entry.kind == EntryKind::Symlink {
            continue;
        }
        let rel = entry.relative.display().to_string();
        let bytes = match fs::read(&entry.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.error(format!("Cannot read {rel}: {e}"));
                continue;
            }
        };
        if !is_text(&entry.path) {
            if TOKEN_BYTES.is_match(&bytes) {
                report.error(format!("Placeholder found in binary file {rel}"));
            }
            continue;
        }

        let text = String::from_utf8_lossy(&bytes);
        let source = is_source_file(&entry.path);
        for (index, line) in text.lines().enumerate() {
            let at = format!("{rel}:{}", index + 1);
            if NESTED.is_match(line) {
                report.error(format!("Nested placeholder syntax at {at}"));
            }
            if source {
                check_declaration(line, &at, profile, report);
            }
            for caps in TOKEN.captures_iter(line) {
                let canonical = token(&caps[1]);
                if profile.contains_key(&caps[1]) && caps[0] != canonical {
                    report.warning(format!(
                        "{at}: '{}' is not written as '{canonical}'; the reverted tree will use the latter",
                        &caps[0]
                    ));
                }
            }
            let lower = line.to_lowercase();
            for (needle, keyword) in &lowered {
                if lower.contains(needle.as_str()) {
                    report.error(format!("Forbidden keyword '{keyword}' at {at}"));
                }
            }
        }
    }
    Ok(())
}

fn check_declaration(line: &str, at: &str, profile: &Profile, report: &mut ValidationReport) {
    let Some(span) = declaration_name_span(line) else {
        return;
    };
    for caps in TOKEN.captures_iter(&line[span]) {
        let key = &caps[1];
        let Some(value) = profile.get(key) else {
            continue;
        };
        if !is_identifier_compatible(value) {
            report.error(format!(
                "{at}: '{{{{ {key} }}}}' names a class or function but '{value}' cannot become an identifier"
            ));
        } else if value.contains(' ') {
            report.warning(format!(
                "{at}: '{{{{ {key} }}}}' names a class or function and '{value}' contains spaces; \
                 consider a dedicated identifier key"
            ));
        }
    }
}

fn check_sensitive_dirs(
    config: &WorkflowConfig,
    vcs: &dyn VersionControl,
    report: &mut ValidationReport,
) -> Result<()> {
    if config.sensitive_dirs.is_empty() {
        return Ok(());
    }
    let tracked = vcs.tracked_files().unwrap_or_else(|| {
        debug!("No version control information; sensitive directories count as untracked");
        Vec::new()
    });
    let gitignore = config.gitignore_path();
    let patterns = fs::read_to_string(&gitignore).unwrap_or_else(|_| {
        debug!("No ignore file at '{}'", gitignore.display());
        String::new()
    });

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.lines().map(str::trim) {
        if pattern.is_empty() || pattern.starts_with('#') || pattern.starts_with('!') {
            continue;
        }
        let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
        builder.add(GlobBuilder::new(&format!("**/{pattern}")).literal_separator(true).build()?);
    }
    let ignored = builder.build()?;

    for dir in &config.sensitive_dirs {
        let dir = normalize(dir);
        if tracked.iter().any(|path| path.starts_with(&dir)) {
            report.error(format!("Sensitive directory '{}' is tracked by version control", dir.display()));
        }
        if !ignored.is_match(&dir) {
            report.warning(format!(
                "Sensitive directory '{}' is not listed in '{}'",
                dir.display(),
                gitignore.display()
            ));
        }
    }
    Ok(())
}

/// Relative paths of every file and symlink under `root`.
fn tree_files(root: &Path) -> Result<BTreeSet<PathBuf>> {
    TreeWalk::new(root).iter().map(|entry| entry.map(|e| e.relative)).collect()
}

enum Comparison {
    Same,
    Cleaned,
    Mismatch,
}

fn compare_files(template: &Path, export: &Path, keywords: &[String]) -> Result<Comparison> {
    let template_link = fs::symlink_metadata(template)?.file_type().is_symlink();
    let export_link = fs::symlink_metadata(export)?.file_type().is_symlink();
    if template_link || export_link {
        let same = template_link
            && export_link
            && fs::read_link(template)? == fs::read_link(export)?;
        return Ok(if same { Comparison::Same } else { Comparison::Mismatch });
    }

    let template_bytes = fs::read(template)?;
    let export_bytes = fs::read(export)?;
    if template_bytes == export_bytes {
        return Ok(Comparison::Same);
    }
    if !is_text(template) {
        return Ok(Comparison::Mismatch);
    }

    let template_text = String::from_utf8_lossy(&template_bytes);
    let export_text = String::from_utf8_lossy(&export_bytes);
    let insensitive = clean_lines(template_text.split_inclusive('\n'), keywords).concat();
    let sensitive: String = template_text
        .split_inclusive('\n')
        .filter(|line| !should_filter_line(line, keywords))
        .collect();
    if insensitive == export_text || sensitive == export_text {
        return Ok(Comparison::Cleaned);
    }
    Ok(Comparison::Mismatch)
}

/// Checks that `export` reproduces `template` minus the overlay paths.
///
/// Files that only differ by keyword lines removed are warnings. Missing,
/// unexpected or otherwise different files are errors, and so is any
/// `expected_absent` overlay path still present in the export.
pub fn verify_export<P: AsRef<Path>, Q: AsRef<Path>>(
    template: P,
    export: Q,
    expected_absent: &[PathBuf],
    keywords: &[String],
) -> Result<ValidationReport> {
    let template = template.as_ref();
    let export = export.as_ref();
    let mut report = ValidationReport::default();
    if !template.is_dir() || !export.is_dir() {
        report.error(format!(
            "Cannot compare '{}' with '{}': both must be directories",
            template.display(),
            export.display()
        ));
        return Ok(report);
    }

    let overlay: BTreeSet<&PathBuf> = expected_absent.iter().collect();
    let template_files: BTreeSet<PathBuf> =
        tree_files(template)?.into_iter().filter(|p| !overlay.contains(p)).collect();
    let export_files = tree_files(export)?;

    for missing in template_files.difference(&export_files) {
        report.error(format!("Missing file: {}", missing.display()));
    }
    for extra in export_files.difference(&template_files) {
        if overlay.contains(extra) {
            report.error(format!("{} found in export (overlay file)", extra.display()));
        } else {
            report.error(format!("Unexpected file: {}", extra.display()));
        }
    }

    let mut matched = 0;
    for relative in template_files.intersection(&export_files) {
        match compare_files(&template.join(relative), &export.join(relative), keywords)? {
            Comparison::Same => matched += 1,
            Comparison::Cleaned => report.warning(format!("{} has cleaned lines", relative.display())),
            Comparison::Mismatch => report.error(format!("{} content mismatch", relative.display())),
        }
    }

    if report.ok() {
        info!("Verified: {matched} file(s) match the template");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_style() {
        assert_eq!(naming_style("API_KEY"), "SCREAMING_SNAKE_CASE");
        assert_eq!(naming_style("HOST"), "SCREAMING_SNAKE_CASE");
        assert_eq!(naming_style("CompanyName"), "PascalCase");
        assert_eq!(naming_style("companyName"), "camelCase");
    }

    #[test]
    fn test_nested_pattern() {
        assert!(NESTED.is_match("{{ {{ X }} }}"));
        assert!(!NESTED.is_match("{{ X }} and {{ Y }}"));
    }

    #[test]
    fn test_report_into_result() {
        let mut report = ValidationReport::default();
        report.warning("just a warning");
        assert!(report.clone().into_result().is_ok());
        report.error("broken");
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, Error::ValidationError { errors } if errors == vec!["broken"]));
    }
}
