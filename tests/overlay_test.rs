use std::fs;
use std::path::{Path, PathBuf};

use stencil::error::Error;
use stencil::inject::inject;
use stencil::overlay::{merge_overlay, read_manifest, read_manifest_file, remove_overlay, write_manifest};
use stencil::profile::Profile;
use stencil::revert::{revert, RevertOptions};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test_log::test]
fn test_overlay_shadow_then_restore() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    let overlay = tmp.path().join("overlay");
    write(&template, "a.txt", "orig={{A}}");
    write(&template, "keep.txt", "kept\n");
    write(&overlay, "a.txt", "private={{A}}");
    write(&overlay, "secret/notes.txt", "internal only\n");
    let profile = Profile::from_pairs([("A", "1")]);

    let private = tmp.path().join("private");
    let report = inject(&template, &private, &profile, Some(overlay.as_path())).unwrap();
    assert_eq!(fs::read_to_string(private.join("a.txt")).unwrap(), "private=1");
    assert_eq!(report.overlay.unwrap().files.len(), 2);

    // Provenance must survive the overlay directory going away.
    fs::remove_dir_all(&overlay).unwrap();

    let public = tmp.path().join("public");
    revert(&private, &public, &profile, RevertOptions::default()).unwrap();
    let removal = remove_overlay(&public, &template, Some(overlay.as_path()), None).unwrap();

    assert_eq!(fs::read_to_string(public.join("a.txt")).unwrap(), "orig={{A}}");
    assert_eq!(removal.restored, vec![PathBuf::from("a.txt")]);
    assert_eq!(removal.removed, vec![PathBuf::from("secret/notes.txt")]);
    assert!(!public.join("secret").exists());
    assert!(!public.join(".overlay_manifest").exists());
    assert!(!dir_diff::is_different(&template, &public).unwrap());
}

#[test]
fn test_manifest_round_trip() {
    let tmp = TempDir::new().unwrap();
    let overlay = tmp.path().join("overlay");
    let dest = tmp.path().join("dest");
    write(&overlay, "x/y.txt", "1");
    write(&overlay, "z.txt", "2");
    fs::create_dir_all(&dest).unwrap();

    let written = write_manifest(&overlay, &dest).unwrap();
    assert_eq!(written, vec![PathBuf::from("x/y.txt"), PathBuf::from("z.txt")]);
    assert_eq!(read_manifest(&dest).unwrap(), Some(written));
    assert_eq!(read_manifest(tmp.path()).unwrap(), None);
}

#[test]
fn test_manifest_rejects_escaping_entries() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), ".overlay_manifest", "ok.txt\n../outside.txt\n/etc/passwd\n\n");
    assert_eq!(read_manifest(tmp.path()).unwrap(), Some(vec![PathBuf::from("ok.txt")]));
}

#[test]
fn test_explicit_manifest_wins() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    let public = tmp.path().join("public");
    write(&template, "t.txt", "t");
    write(&public, "t.txt", "t");
    write(&public, "one.txt", "1");
    write(&public, "two.txt", "2");
    write(&public, ".overlay_manifest", "one.txt\n");

    let explicit = vec![PathBuf::from("two.txt")];
    remove_overlay(&public, &template, None, Some(explicit.as_slice())).unwrap();
    assert!(public.join("one.txt").exists());
    assert!(!public.join("two.txt").exists());
}

#[test]
fn test_live_overlay_used_without_manifest() {
    let tmp = TempDir::new().unwrap();
    let template = tmp.path().join("template");
    let overlay = tmp.path().join("overlay");
    let public = tmp.path().join("public");
    write(&template, "t.txt", "t");
    write(&overlay, "extra/o.txt", "o");
    write(&public, "t.txt", "t");
    write(&public, "extra/o.txt", "o");

    let removal = remove_overlay(&public, &template, Some(overlay.as_path()), None).unwrap();
    assert_eq!(removal.removed, vec![PathBuf::from("extra/o.txt")]);
    assert!(!public.join("extra").exists());
}

#[cfg(unix)]
#[test]
fn test_symlinks_outside_overlay_are_skipped() {
    use std::os::unix::fs::symlink;

    let tmp = TempDir::new().unwrap();
    let overlay = tmp.path().join("overlay");
    let dest = tmp.path().join("dest");
    write(&overlay, "real.txt", "real");
    write(tmp.path(), "outside.txt", "secret");
    fs::create_dir_all(&dest).unwrap();
    symlink("real.txt", overlay.join("inside_link")).unwrap();
    symlink(tmp.path().join("outside.txt"), overlay.join("outside_link")).unwrap();
    symlink("../../nowhere", overlay.join("broken_outside")).unwrap();

    let merge = merge_overlay(&overlay, &dest).unwrap();
    assert!(fs::symlink_metadata(dest.join("inside_link")).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(dest.join("inside_link")).unwrap(), PathBuf::from("real.txt"));
    assert!(!dest.join("outside_link").exists());
    assert_eq!(
        merge.security_skips,
        vec![PathBuf::from("broken_outside"), PathBuf::from("outside_link")]
    );
}

#[test]
fn test_missing_manifest_file_is_a_config_error() {
    let tmp = TempDir::new().unwrap();
    let err = read_manifest_file(tmp.path().join("absent_manifest")).unwrap_err();
    assert!(matches!(err, Error::ConfigError(message) if message.contains("absent_manifest")));

    write(tmp.path(), "manifest.txt", "a.txt\n");
    assert_eq!(
        read_manifest_file(tmp.path().join("manifest.txt")).unwrap(),
        vec![PathBuf::from("a.txt")]
    );
}
