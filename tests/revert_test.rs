use std::fs;
use std::path::Path;

use stencil::error::Error;
use stencil::inject::inject;
use stencil::profile::Profile;
use stencil::revert::{revert, AmbiguityPolicy, RevertOptions};
use tempfile::TempDir;

fn tree_with(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

#[test]
fn test_no_partial_word_corruption() {
    let tmp = TempDir::new().unwrap();
    let concrete = tmp.path().join("concrete");
    tree_with(&concrete, &[("users.txt", "admin badmington\n")]);
    let profile = Profile::from_pairs([("USER", "admin")]);

    let exact = RevertOptions { exact: true, ..Default::default() };
    revert(&concrete, tmp.path().join("exact"), &profile, exact).unwrap();
    assert_eq!(read(&tmp.path().join("exact"), "users.txt"), "admin badmington\n");

    let report = revert(&concrete, tmp.path().join("smart"), &profile, RevertOptions::default())
        .unwrap();
    assert_eq!(read(&tmp.path().join("smart"), "users.txt"), "{{ USER }} badmington\n");
    assert_eq!(report.replacements, 1);
    assert_eq!(report.ambiguous.len(), 1);
    assert_eq!(report.ambiguous[0].value, "admin");
}

#[test]
fn test_mixed_occurrences_on_one_line_round_trip() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    tree_with(&template, &[("env.txt", "user={{ USER }} dir=/home/{{ USER }}_data\n")]);
    let profile = Profile::from_pairs([("USER", "admin")]);

    let concrete = tmp.path().join("concrete");
    inject(&template, &concrete, &profile, None).unwrap();
    assert_eq!(read(&concrete, "env.txt"), "user=admin dir=/home/admin_data\n");

    let back = tmp.path().join("back");
    let report = revert(&concrete, &back, &profile, RevertOptions::default()).unwrap();
    assert_eq!(read(&back, "env.txt"), read(&template, "env.txt"));
    assert_eq!(report.replacements, 2);
    assert_eq!(report.smart_matches, 1);
    assert!(report.ambiguous.is_empty());
}

#[test]
fn test_longest_match_precedence() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    tree_with(
        &template,
        &[("api.txt", "{{ INTERNAL_URL }}{{ API_VERSION }}\nbase={{ INTERNAL_URL }}/{{ API_VERSION }}\n")],
    );
    let profile = Profile::from_pairs([
        ("API_VERSION", "v2"),
        ("INTERNAL_URL", "https://internal.acme.com"),
    ]);

    let concrete = tmp.path().join("concrete");
    inject(&template, &concrete, &profile, None).unwrap();
    assert_eq!(
        read(&concrete, "api.txt"),
        "https://internal.acme.comv2\nbase=https://internal.acme.com/v2\n"
    );

    let back = tmp.path().join("back");
    let report = revert(&concrete, &back, &profile, RevertOptions::default()).unwrap();
    assert_eq!(read(&back, "api.txt"), read(&template, "api.txt"));
    assert_eq!(report.smart_matches, 1);
}

#[test_log::test]
fn test_ambiguous_matches_are_skipped_and_reported() {
    let tmp = TempDir::new().unwrap();
    let concrete = tmp.path().join("concrete");
    tree_with(&concrete, &[("code.txt", "NewACME CorpClient\nowner: ACME Corp\n")]);
    let profile = Profile::from_pairs([("COMPANY_NAME", "ACME Corp")]);

    let back = tmp.path().join("back");
    let report = revert(&concrete, &back, &profile, RevertOptions::default()).unwrap();
    assert_eq!(read(&back, "code.txt"), "NewACME CorpClient\nowner: {{ COMPANY_NAME }}\n");
    assert_eq!(report.ambiguous.len(), 1);
    assert_eq!(report.ambiguous[0].line, 1);
    assert_eq!(report.ambiguous[0].value, "ACME Corp");
}

#[test]
fn test_ambiguity_policy_error() {
    let tmp = TempDir::new().unwrap();
    let concrete = tmp.path().join("concrete");
    tree_with(&concrete, &[("code.txt", "NewACME CorpClient\n")]);
    let profile = Profile::from_pairs([("COMPANY_NAME", "ACME Corp")]);

    let options = RevertOptions { exact: false, on_ambiguous: AmbiguityPolicy::Error };
    match revert(&concrete, tmp.path().join("back"), &profile, options) {
        Err(Error::AmbiguousMatchError { matches }) => {
            assert_eq!(matches.len(), 1);
            assert!(matches[0].contains("code.txt:1"));
        }
        other => panic!("Expected AmbiguousMatchError, got {other:?}"),
    }
}

#[test]
fn test_identifier_forms_in_declarations() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    tree_with(
        &template,
        &[(
            "service.py",
            "class {{ COMPANY_NAME }}Client:\n    def get_{{ DATA_KIND }}_data(self):\n        return '{{ DATA_KIND }}'\n",
        )],
    );
    let profile = Profile::from_pairs([("COMPANY_NAME", "ACME Corp"), ("DATA_KIND", "real-time")]);

    let concrete = tmp.path().join("concrete");
    inject(&template, &concrete, &profile, None).unwrap();
    assert_eq!(
        read(&concrete, "service.py"),
        "class ACME_CorpClient:\n    def get_real_time_data(self):\n        return 'real-time'\n"
    );

    let back = tmp.path().join("back");
    revert(&concrete, &back, &profile, RevertOptions::default()).unwrap();
    assert_eq!(read(&back, "service.py"), read(&template, "service.py"));

    // Exact mode never reverses sanitized identifiers.
    let exact = tmp.path().join("exact");
    revert(&concrete, &exact, &profile, RevertOptions { exact: true, ..Default::default() })
        .unwrap();
    assert!(read(&exact, "service.py").starts_with("class ACME_CorpClient:"));
}

#[test]
fn test_overlay_manifest_is_not_reverted() {
    let tmp = TempDir::new().unwrap();
    let concrete = tmp.path().join("concrete");
    tree_with(&concrete, &[(".overlay_manifest", "acme/notes.txt\n"), ("acme/notes.txt", "acme\n")]);
    let profile = Profile::from_pairs([("ORG", "acme")]);

    let back = tmp.path().join("back");
    revert(&concrete, &back, &profile, RevertOptions::default()).unwrap();
    assert_eq!(read(&back, ".overlay_manifest"), "acme/notes.txt\n");
    assert_eq!(read(&back, "acme/notes.txt"), "{{ ORG }}\n");
}
