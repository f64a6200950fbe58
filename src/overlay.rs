//! Overlay merging and removal.
//!
//! An overlay holds files that exist only in the concrete tree. Merging
//! layers them over the copied template and records their relative paths in
//! a manifest sidecar. Removal uses that manifest, so it still works after
//! the overlay directory itself is gone.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::constants::OVERLAY_MANIFEST_FILE;
use crate::error::{Error, Result};
use crate::tree::{
    copy_entry, is_safe_relative, normalize, prune_empty_dirs, to_slash, EntryKind, TreeWalk,
};

/// Result of layering an overlay onto a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayMerge {
    /// Overlay-relative paths copied into the destination
    pub files: Vec<PathBuf>,
    /// Symlinks refused because they resolve outside the overlay root
    pub security_skips: Vec<PathBuf>,
}

/// Result of stripping an overlay from a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayRemoval {
    /// Paths where the template's own file was put back
    pub restored: Vec<PathBuf>,
    /// Overlay-only paths that were deleted
    pub removed: Vec<PathBuf>,
}

/// True if the symlink at `link` resolves inside `root` (already canonical).
///
/// Broken links are judged by their lexically normalized target.
fn link_stays_within(root: &Path, link: &Path) -> std::io::Result<bool> {
    let target = fs::read_link(link)?;
    let joined = if target.is_absolute() {
        target
    } else {
        let parent = link.parent().unwrap_or(Path::new("."));
        fs::canonicalize(parent)?.join(target)
    };
    let resolved = fs::canonicalize(&joined).unwrap_or_else(|_| normalize(&joined));
    Ok(resolved.starts_with(root))
}

/// Layers the files of `overlay` onto `dest`, file by file.
///
/// Symlinks are recreated as symlinks only when their target resolves within
/// the overlay root; any other link is skipped and logged.
pub fn merge_overlay<P: AsRef<Path>, Q: AsRef<Path>>(overlay: P, dest: Q) -> Result<OverlayMerge> {
    let overlay = overlay.as_ref();
    let dest = dest.as_ref();
    if !overlay.is_dir() {
        return Err(Error::SourceDoesNotExistError { source_dir: overlay.display().to_string() });
    }
    let root = fs::canonicalize(overlay)?;
    let mut merge = OverlayMerge::default();

    for entry in TreeWalk::new(overlay).iter() {
        let entry = entry?;
        if entry.kind == EntryKind::Symlink {
            let within = link_stays_within(&root, &entry.path)
                .map_err(|e| Error::substitution(&entry.path, e))?;
            if !within {
                warn!(
                    "Security skip: symlink '{}' points outside the overlay root",
                    entry.path.display()
                );
                merge.security_skips.push(entry.relative);
                continue;
            }
        }
        let target = dest.join(&entry.relative);
        if target.exists() {
            debug!("Overlay shadows '{}'", entry.relative.display());
        }
        copy_entry(&entry.path, entry.kind, &target)?;
        merge.files.push(entry.relative);
    }

    info!("Merged {} overlay file(s) from '{}'", merge.files.len(), overlay.display());
    Ok(merge)
}

/// Every relative file path currently present in `overlay`.
fn overlay_paths(overlay: &Path) -> Result<Vec<PathBuf>> {
    TreeWalk::new(overlay).iter().map(|entry| entry.map(|e| e.relative)).collect()
}

/// Records the overlay's relative file paths in the manifest under `dest`.
pub fn write_manifest<P: AsRef<Path>, Q: AsRef<Path>>(overlay: P, dest: Q) -> Result<Vec<PathBuf>> {
    let paths = overlay_paths(overlay.as_ref())?;
    let manifest = dest.as_ref().join(OVERLAY_MANIFEST_FILE);
    let mut content = String::new();
    for path in &paths {
        content.push_str(&to_slash(path));
        content.push('\n');
    }
    fs::write(&manifest, content).map_err(|e| Error::substitution(&manifest, e))?;
    debug!("Wrote overlay manifest '{}' ({} entries)", manifest.display(), paths.len());
    Ok(paths)
}

/// Reads a manifest file written by [`write_manifest`].
///
/// Entries that are absolute or climb out of the tree are dropped with a warning.
/// A missing manifest is an `Error::ConfigError`.
pub fn read_manifest_file<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::ConfigError(format!(
            "overlay manifest '{}' does not exist",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)?;
    let mut paths = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let path = PathBuf::from(line);
        if is_safe_relative(&path) {
            paths.push(path);
        } else {
            warn!("Ignoring manifest entry '{}': not a relative path", line);
        }
    }
    Ok(paths)
}

/// Reads the manifest under `tree`, if one was written there.
pub fn read_manifest<P: AsRef<Path>>(tree: P) -> Result<Option<Vec<PathBuf>>> {
    let manifest = tree.as_ref().join(OVERLAY_MANIFEST_FILE);
    if !manifest.is_file() {
        return Ok(None);
    }
    read_manifest_file(&manifest).map(Some)
}

/// Strips overlay files from `public`.
///
/// Provenance comes from `manifest` when given, else from the manifest
/// persisted under `public`, else from the current contents of `overlay`.
/// A path the template also has is restored to the template's version; an
/// overlay-only path is deleted and the directories it leaves empty are
/// pruned. The manifest sidecar itself is removed last.
pub fn remove_overlay(
    public: &Path,
    template: &Path,
    overlay: Option<&Path>,
    manifest: Option<&[PathBuf]>,
) -> Result<OverlayRemoval> {
    let paths = match manifest {
        Some(paths) => paths.to_vec(),
        None => match read_manifest(public)? {
            Some(paths) => paths,
            None => match overlay {
                Some(overlay) if overlay.is_dir() => {
                    info!("No overlay manifest in '{}', using '{}'", public.display(), overlay.display());
                    overlay_paths(overlay)?
                }
                _ => {
                    debug!("No overlay provenance for '{}'", public.display());
                    Vec::new()
                }
            },
        },
    };

    let mut removal = OverlayRemoval::default();
    for relative in paths {
        if !is_safe_relative(&relative) {
            warn!("Refusing to remove '{}': not a relative path", relative.display());
            continue;
        }
        let target = public.join(&relative);
        let original = template.join(&relative);
        match fs::symlink_metadata(&original) {
            Ok(meta) if !meta.is_dir() => {
                let kind = if meta.file_type().is_symlink() {
                    EntryKind::Symlink
                } else {
                    EntryKind::File
                };
                copy_entry(&original, kind, &target)?;
                debug!("Restored template version of '{}'", relative.display());
                removal.restored.push(relative);
            }
            _ => {
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target).map_err(|e| Error::substitution(&target, e))?;
                    debug!("Removed overlay file '{}'", relative.display());
                    if let Some(parent) = target.parent() {
                        prune_empty_dirs(public, parent);
                    }
                    removal.removed.push(relative);
                }
            }
        }
    }

    let sidecar = public.join(OVERLAY_MANIFEST_FILE);
    if sidecar.exists() {
        fs::remove_file(&sidecar).map_err(|e| Error::substitution(&sidecar, e))?;
    }

    info!(
        "Overlay removed from '{}': {} restored, {} deleted",
        public.display(),
        removal.restored.len(),
        removal.removed.len()
    );
    Ok(removal)
}
