//! Tree enumeration and copying.
//!
//! Transforms run as two stages: [`TreeWalk`] enumerates the entries of a
//! tree, and a per-file function is applied to each entry. A `TreeWalk` is a
//! description of the walk, not the walk itself, so it can be iterated any
//! number of times.

use std::fs;
use std::path::{Component, Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Kind of a non-directory tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Symlink,
}

/// A file or symlink found under a tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Absolute (or root-joined) path of the entry
    pub path: PathBuf,
    /// Path relative to the tree root
    pub relative: PathBuf,
    pub kind: EntryKind,
}

/// Restartable enumeration of the files and symlinks under `root`.
///
/// Entries come out sorted by file name within each directory. Symlinks are
/// reported as such and never followed.
#[derive(Debug, Clone)]
pub struct TreeWalk {
    root: PathBuf,
    skip: Vec<PathBuf>,
}

impl TreeWalk {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf(), skip: Vec::new() }
    }

    /// Excludes a root-relative path (file or directory) from the walk.
    pub fn skip<P: AsRef<Path>>(mut self, relative: P) -> Self {
        self.skip.push(relative.as_ref().to_path_buf());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<TreeEntry>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                !self.skip.iter().any(|s| relative == s.as_path())
            })
            .filter_map(move |entry| {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => return Some(Err(Error::WalkDirError(e))),
                };
                let file_type = entry.file_type();
                let kind = if file_type.is_symlink() {
                    EntryKind::Symlink
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    return None;
                };
                let relative = entry.path().strip_prefix(&self.root).ok()?.to_path_buf();
                Some(Ok(TreeEntry { path: entry.path().to_path_buf(), relative, kind }))
            })
    }
}

/// Normalizes `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `path` is relative and never climbs above its base.
pub fn is_safe_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Absolute form of `path`, canonical when it exists.
pub fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };
    normalize(&joined)
}

/// Renders a relative path with forward slashes for sidecar files and messages.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

/// Removes whatever sits at `path` (file, symlink or directory), if anything.
pub fn remove_existing(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copies one entry to `dest`, recreating symlinks as symlinks.
pub fn copy_entry(source: &Path, kind: EntryKind, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::substitution(parent, e))?;
    }
    remove_existing(dest).map_err(|e| Error::substitution(dest, e))?;
    match kind {
        EntryKind::Symlink => {
            let target = fs::read_link(source).map_err(|e| Error::substitution(source, e))?;
            create_symlink(&target, dest).map_err(|e| Error::substitution(dest, e))
        }
        EntryKind::File => fs::copy(source, dest)
            .map(|_| ())
            .map_err(|e| Error::substitution(dest, e)),
    }
}

/// Recursively copies `source` into a fresh `dest`.
///
/// Fails with [`Error::DestinationExistsError`] when `dest` already exists;
/// the caller decides whether to clean it. Empty directories are recreated.
pub fn copy_tree<P: AsRef<Path>, Q: AsRef<Path>>(source: P, dest: Q) -> Result<()> {
    let source = source.as_ref();
    let dest = dest.as_ref();
    if !source.is_dir() {
        return Err(Error::SourceDoesNotExistError { source_dir: source.display().to_string() });
    }
    if fs::symlink_metadata(dest).is_ok() {
        return Err(Error::DestinationExistsError { dest: dest.display().to_string() });
    }
    debug!("Copying tree '{}' to '{}'.", source.display(), dest.display());

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::substitution(&target, e))?;
        } else if file_type.is_symlink() {
            copy_entry(entry.path(), EntryKind::Symlink, &target)?;
        } else if file_type.is_file() {
            copy_entry(entry.path(), EntryKind::File, &target)?;
        }
    }
    Ok(())
}

/// Removes empty directories from `start` upwards, stopping at `root`.
pub fn prune_empty_dirs(root: &Path, start: &Path) {
    let mut current = start.to_path_buf();
    while current != root && current.starts_with(root) {
        let is_empty = fs::read_dir(&current).map(|mut it| it.next().is_none()).unwrap_or(false);
        if !is_empty || fs::remove_dir(&current).is_err() {
            break;
        }
        debug!("Pruned empty directory '{}'.", current.display());
        if !current.pop() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_walk_is_restartable_and_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/two.txt"), "2").unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();

        let walk = TreeWalk::new(dir.path());
        let first: Vec<_> = walk.iter().map(|e| e.unwrap().relative).collect();
        let second: Vec<_> = walk.iter().map(|e| e.unwrap().relative).collect();
        assert_eq!(first, vec![PathBuf::from("a.txt"), PathBuf::from("b/two.txt")]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_walk_skip() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("skip")).unwrap();
        fs::write(dir.path().join("skip/x.txt"), "x").unwrap();
        fs::write(dir.path().join("keep.txt"), "k").unwrap();

        let walk = TreeWalk::new(dir.path()).skip("skip");
        let entries: Vec<_> = walk.iter().map(|e| e.unwrap().relative).collect();
        assert_eq!(entries, vec![PathBuf::from("keep.txt")]);
    }

    #[test]
    fn test_normalize_and_safe_relative() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert!(is_safe_relative(Path::new("a/b.txt")));
        assert!(!is_safe_relative(Path::new("../a")));
        assert!(!is_safe_relative(Path::new("/etc/passwd")));
        assert_eq!(to_slash(Path::new("a").join("b").as_path()), "a/b");
    }

    #[test]
    fn test_copy_tree_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("empty")).unwrap();
        fs::write(src.join("f.txt"), "f").unwrap();

        copy_tree(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("f.txt")).unwrap(), "f");
        assert!(dst.join("empty").is_dir());

        assert!(matches!(copy_tree(&src, &dst), Err(Error::DestinationExistsError { .. })));
    }

    #[test]
    fn test_prune_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(dir.path().join("a/keep.txt"), "k").unwrap();

        prune_empty_dirs(dir.path(), &deep);
        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a").exists());
    }
}
