use std::fs;
use std::path::Path;

use stencil::error::Error;
use stencil::inject::inject;
use stencil::profile::Profile;
use stencil::revert::{revert, RevertOptions};
use tempfile::TempDir;

fn write<P: AsRef<Path>>(root: P, relative: &str, content: &[u8]) {
    let path = root.as_ref().join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_profile() -> Profile {
    Profile::from_pairs([
        ("HOST", "db.internal"),
        ("INTERNAL_URL", "https://internal.acme.com"),
        ("API_VERSION", "v2"),
        ("COMPANY_NAME", "ACME Corp"),
    ])
}

#[test_log::test]
fn test_round_trip_restores_template() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    write(&template, "config/app.yaml", b"host: {{ HOST }}\nurl: {{ INTERNAL_URL }}/{{ API_VERSION }}\n");
    write(&template, "src/app.py", b"NAME = '{{ COMPANY_NAME }}'\n\ndef main():\n    return NAME\n");
    write(&template, "README.md", b"# Service\n\nNo placeholders here.\n");
    write(&template, "assets/blob.bin", b"\x00\x01{{ HOST }}\x02");
    fs::create_dir_all(template.join("empty")).unwrap();

    let concrete = tmp.path().join("concrete");
    let profile = sample_profile();
    let report = inject(&template, &concrete, &profile, None).unwrap();
    assert_eq!(report.files_rewritten.len(), 2);
    assert_eq!(report.substitutions, 4);
    assert_eq!(report.binary_skipped.len(), 1);
    assert_eq!(
        fs::read_to_string(concrete.join("config/app.yaml")).unwrap(),
        "host: db.internal\nurl: https://internal.acme.com/v2\n"
    );

    let back = tmp.path().join("back");
    let reverted = revert(&concrete, &back, &profile, RevertOptions::default()).unwrap();
    assert!(reverted.ambiguous.is_empty());
    assert!(!dir_diff::is_different(&template, &back).unwrap());
}

#[test]
fn test_binary_files_are_untouched() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    let bytes = b"\x00\x01{{TOKEN}}\x02";
    write(&template, "firmware.bin", bytes);

    let concrete = tmp.path().join("concrete");
    let profile = Profile::from_pairs([("TOKEN", "secret")]);
    let report = inject(&template, &concrete, &profile, None).unwrap();

    assert_eq!(fs::read(concrete.join("firmware.bin")).unwrap(), bytes);
    assert!(report.files_rewritten.is_empty());
}

#[test]
fn test_declarations_receive_identifier_form() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    write(
        &template,
        "client.py",
        b"class {{ COMPANY_NAME }}Client:\n    label = '{{ COMPANY_NAME }}'\n",
    );

    let concrete = tmp.path().join("concrete");
    let report = inject(&template, &concrete, &sample_profile(), None).unwrap();
    assert_eq!(report.identifier_substitutions, 1);
    assert_eq!(
        fs::read_to_string(concrete.join("client.py")).unwrap(),
        "class ACME_CorpClient:\n    label = 'ACME Corp'\n"
    );

    // Declarations only matter in source files.
    write(&template, "notes.txt", b"class {{ COMPANY_NAME }}Client\n");
    let other = tmp.path().join("other");
    inject(&template, &other, &sample_profile(), None).unwrap();
    assert_eq!(
        fs::read_to_string(other.join("notes.txt")).unwrap(),
        "class ACME CorpClient\n"
    );
}

#[test]
fn test_unknown_tokens_stay_and_unchanged_files_are_not_rewritten() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    write(&template, "a.txt", b"{{ UNKNOWN_KEY }} and {{HOST}}\n");
    write(&template, "b.txt", b"nothing to do\n");

    let concrete = tmp.path().join("concrete");
    let report = inject(&template, &concrete, &sample_profile(), None).unwrap();
    assert_eq!(report.files_rewritten, vec![std::path::PathBuf::from("a.txt")]);
    assert_eq!(
        fs::read_to_string(concrete.join("a.txt")).unwrap(),
        "{{ UNKNOWN_KEY }} and db.internal\n"
    );
}

#[test]
fn test_existing_destination_is_refused() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    write(&template, "a.txt", b"{{ HOST }}\n");
    let concrete = tmp.path().join("concrete");
    fs::create_dir_all(&concrete).unwrap();

    let err = inject(&template, &concrete, &sample_profile(), None).unwrap_err();
    assert!(matches!(err, Error::DestinationExistsError { .. }));
}

#[test]
fn test_missing_template_is_refused() {
    let tmp = TempDir::new().unwrap();
    let err = inject(tmp.path().join("nope"), tmp.path().join("out"), &sample_profile(), None)
        .unwrap_err();
    assert!(matches!(err, Error::SourceDoesNotExistError { .. }));
}
