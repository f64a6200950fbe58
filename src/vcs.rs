//! Version control capability used by snapshots and the validator.
//!
//! Queries return `None` when no information is available; a snapshot is
//! still taken in that case, only without branch/commit data.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{Repository, ResetType, Status, StatusOptions};
use log::debug;

use crate::error::{Error, Result};
use crate::tree::prune_empty_dirs;

/// The operations the snapshot store needs from a version control system.
pub trait VersionControl {
    /// Tracked file paths relative to the working tree root.
    fn tracked_files(&self) -> Option<Vec<PathBuf>>;
    /// Short name of the checked out branch (`HEAD` when detached).
    fn current_branch(&self) -> Option<String>;
    fn current_commit(&self) -> Option<String>;
    /// Two status columns, a space, then the path; one entry per line.
    fn status_porcelain(&self) -> Option<String>;
    fn checkout(&self, branch: &str) -> Result<()>;
    fn reset_hard(&self, commit: &str) -> Result<()>;
    /// Deletes untracked files, sparing anything under the `keep` paths.
    fn clean_untracked(&self, keep: &[PathBuf]) -> Result<()>;
}

/// Paths with a staged change or untracked, from porcelain status output.
pub fn dirty_files(status: &str) -> Vec<String> {
    status
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with(' '))
        .filter_map(|line| line.get(3..))
        .map(str::to_string)
        .collect()
}

/// Git working tree opened through libgit2.
pub struct GitBackend {
    repo: Repository,
}

impl GitBackend {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let repo = Repository::open(root.as_ref())?;
        Ok(Self { repo })
    }

    fn workdir(&self) -> Result<&Path> {
        self.repo
            .workdir()
            .ok_or_else(|| Error::SnapshotError("repository has no working tree".to_string()))
    }
}

fn index_code(status: Status) -> char {
    if status.is_index_new() {
        'A'
    } else if status.is_index_modified() {
        'M'
    } else if status.is_index_deleted() {
        'D'
    } else if status.is_index_renamed() {
        'R'
    } else if status.is_index_typechange() {
        'T'
    } else {
        ' '
    }
}

fn worktree_code(status: Status) -> char {
    if status.is_wt_modified() {
        'M'
    } else if status.is_wt_deleted() {
        'D'
    } else if status.is_wt_renamed() {
        'R'
    } else if status.is_wt_typechange() {
        'T'
    } else {
        ' '
    }
}

impl VersionControl for GitBackend {
    fn tracked_files(&self) -> Option<Vec<PathBuf>> {
        let index = self.repo.index().ok()?;
        Some(
            index
                .iter()
                .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
                .collect(),
        )
    }

    fn current_branch(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        head.shorthand().map(str::to_string)
    }

    fn current_commit(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        head.peel_to_commit().ok().map(|commit| commit.id().to_string())
    }

    fn status_porcelain(&self) -> Option<String> {
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut options)).ok()?;

        let mut lines = Vec::new();
        for entry in statuses.iter() {
            let status = entry.status();
            let Some(path) = entry.path() else { continue };
            if status.is_ignored() {
                continue;
            }
            if status.is_wt_new() && index_code(status) == ' ' {
                lines.push(format!("?? {path}"));
            } else {
                lines.push(format!("{}{} {path}", index_code(status), worktree_code(status)));
            }
        }
        Some(lines.join("\n"))
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        if branch == "HEAD" {
            debug!("Detached HEAD recorded, skipping branch checkout");
            return Ok(());
        }
        let (object, reference) = self.repo.revparse_ext(branch)?;
        self.repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))?;
        match reference.as_ref().and_then(|r| r.name()) {
            Some(name) => self.repo.set_head(name)?,
            None => self.repo.set_head_detached(object.id())?,
        }
        Ok(())
    }

    fn reset_hard(&self, commit: &str) -> Result<()> {
        let object = self.repo.revparse_single(commit)?;
        self.repo.reset(&object, ResetType::Hard, None)?;
        Ok(())
    }

    fn clean_untracked(&self, keep: &[PathBuf]) -> Result<()> {
        let root = self.workdir()?.to_path_buf();
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut options))?;

        let untracked: Vec<PathBuf> = statuses
            .iter()
            .filter(|entry| entry.status().is_wt_new())
            .filter_map(|entry| entry.path().map(PathBuf::from))
            .filter(|path| !keep.iter().any(|k| path.starts_with(k)))
            .collect();

        for relative in untracked {
            let path = root.join(&relative);
            std::fs::remove_file(&path).map_err(|e| Error::substitution(&path, e))?;
            debug!("Removed untracked file '{}'", relative.display());
            if let Some(parent) = path.parent() {
                prune_empty_dirs(&root, parent);
            }
        }
        Ok(())
    }
}

/// Stand-in for trees outside version control; knows nothing, changes nothing.
#[derive(Debug, Default)]
pub struct Untracked;

impl VersionControl for Untracked {
    fn tracked_files(&self) -> Option<Vec<PathBuf>> {
        None
    }

    fn current_branch(&self) -> Option<String> {
        None
    }

    fn current_commit(&self) -> Option<String> {
        None
    }

    fn status_porcelain(&self) -> Option<String> {
        None
    }

    fn checkout(&self, _branch: &str) -> Result<()> {
        Ok(())
    }

    fn reset_hard(&self, _commit: &str) -> Result<()> {
        Ok(())
    }

    fn clean_untracked(&self, _keep: &[PathBuf]) -> Result<()> {
        Ok(())
    }
}

/// Opens the Git repository at `root`, or falls back to [`Untracked`].
pub fn detect<P: AsRef<Path>>(root: P) -> Box<dyn VersionControl> {
    match GitBackend::open(root.as_ref()) {
        Ok(git) => Box::new(git),
        Err(e) => {
            debug!("No Git repository at '{}': {}", root.as_ref().display(), e);
            Box::new(Untracked)
        }
    }
}
