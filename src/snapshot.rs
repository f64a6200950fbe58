//! Snapshots of version-controlled files and rollback to them.
//!
//! Each snapshot lives in its own directory under [`SNAPSHOT_DIR`], named by
//! a sortable UTC timestamp, and is never modified after creation:
//!
//! ```text
//! .workflow-rollbacks/
//!   20260101T120000123456Z/
//!     files/           copies of every tracked file
//!     metadata.json    SnapshotMetadata
//!     git-state.json   GitState
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    SNAPSHOT_DIR, SNAPSHOT_FILES_DIR, SNAPSHOT_GIT_STATE_FILE, SNAPSHOT_METADATA_FILE,
};
use crate::error::{Error, Result};
use crate::tree::{copy_entry, to_slash, EntryKind, TreeWalk};
use crate::vcs::{self, dirty_files, VersionControl};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub timestamp: String,
    pub operation: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub files_hash: String,
    #[serde(default)]
    pub config_snapshot: serde_json::Value,
    #[serde(default)]
    pub dirty_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitState {
    pub branch: String,
    pub commit: String,
    pub status: String,
}

/// Snapshot storage for one working tree.
pub struct SnapshotStore {
    root: PathBuf,
    storage: PathBuf,
    max_history: usize,
    vcs: Box<dyn VersionControl>,
}

impl SnapshotStore {
    /// Creates the store, making the storage directory if needed.
    ///
    /// `max_history` below one is treated as one, so the latest snapshot
    /// always survives pruning.
    pub fn new<P: AsRef<Path>>(
        root: P,
        max_history: usize,
        vcs: Box<dyn VersionControl>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let storage = root.join(SNAPSHOT_DIR);
        fs::create_dir_all(&storage)?;
        Ok(Self { root, storage, max_history: max_history.max(1), vcs })
    }

    /// Store for `root`, backed by Git when `root` is a repository.
    pub fn open<P: AsRef<Path>>(root: P, max_history: usize) -> Result<Self> {
        let vcs = vcs::detect(root.as_ref());
        Self::new(root, max_history, vcs)
    }

    pub fn storage(&self) -> &Path {
        &self.storage
    }

    pub fn vcs(&self) -> &dyn VersionControl {
        self.vcs.as_ref()
    }

    fn next_id(&self) -> String {
        let base = Utc::now().format("%Y%m%dT%H%M%S%6fZ").to_string();
        if !self.storage.join(&base).exists() {
            return base;
        }
        (1..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !self.storage.join(id).exists())
            .unwrap_or(base)
    }

    /// Copies tracked files into `files_dir` and returns the content hash.
    ///
    /// Missing, directory and unreadable entries are logged and skipped.
    fn copy_tracked_files(&self, tracked: &[PathBuf], files_dir: &Path) -> String {
        let mut hasher = Sha256::new();
        let (mut copied, mut failed) = (0usize, 0usize);

        for relative in tracked {
            if relative.starts_with(SNAPSHOT_DIR) {
                continue;
            }
            let source = self.root.join(relative);
            let meta = match fs::symlink_metadata(&source) {
                Ok(meta) => meta,
                Err(_) => {
                    info!("Tracked file not in working tree: {}", relative.display());
                    continue;
                }
            };
            if meta.is_dir() {
                info!("Skipping directory: {}", relative.display());
                continue;
            }

            let target = files_dir.join(relative);
            let outcome = if meta.file_type().is_symlink() {
                fs::read_link(&source).map_err(Error::from).and_then(|link| {
                    hasher.update(to_slash(relative).as_bytes());
                    hasher.update(to_slash(&link).as_bytes());
                    copy_entry(&source, EntryKind::Symlink, &target)
                })
            } else {
                fs::read(&source).map_err(Error::from).and_then(|bytes| {
                    hasher.update(to_slash(relative).as_bytes());
                    hasher.update(&bytes);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&target, &bytes).map_err(Error::from)
                })
            };
            match outcome {
                Ok(()) => copied += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Could not copy {}: {}", relative.display(), e);
                }
            }
        }

        info!("Snapshot: {copied} file(s) copied, {failed} failed");
        format!("{:x}", hasher.finalize())
    }

    /// Records the tracked files and VCS state; returns the snapshot id.
    pub fn create_snapshot(&self, operation: &str, config: serde_json::Value) -> Result<String> {
        let id = self.next_id();
        let dir = self.storage.join(&id);
        let files_dir = dir.join(SNAPSHOT_FILES_DIR);
        fs::create_dir_all(&files_dir)?;

        let branch = self.vcs.current_branch().unwrap_or_default();
        let commit = self.vcs.current_commit().unwrap_or_default();
        let status = self.vcs.status_porcelain().unwrap_or_default();
        let tracked = self.vcs.tracked_files().unwrap_or_else(|| {
            info!("'{}' is not under version control; snapshot holds no files", self.root.display());
            Vec::new()
        });

        let files_hash = self.copy_tracked_files(&tracked, &files_dir);
        let metadata = SnapshotMetadata {
            timestamp: id.clone(),
            operation: operation.to_string(),
            branch: branch.clone(),
            commit: commit.clone(),
            files_hash,
            config_snapshot: config,
            dirty_files: dirty_files(&status),
        };
        let state = GitState { branch, commit, status };
        fs::write(dir.join(SNAPSHOT_METADATA_FILE), serde_json::to_string_pretty(&metadata)?)?;
        fs::write(dir.join(SNAPSHOT_GIT_STATE_FILE), serde_json::to_string_pretty(&state)?)?;

        self.cleanup_old_snapshots()?;
        info!("Created snapshot {id} for '{operation}'");
        Ok(id)
    }

    fn snapshot_dir(&self, id: &str) -> Option<PathBuf> {
        let single = Path::new(id).components().count() == 1;
        if id.is_empty() || id.contains("..") || !single {
            return None;
        }
        Some(self.storage.join(id))
    }

    fn read_metadata(&self, id: &str) -> Option<SnapshotMetadata> {
        let dir = self.snapshot_dir(id)?;
        let content = fs::read_to_string(dir.join(SNAPSHOT_METADATA_FILE)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Ids of stored snapshots, oldest first.
    fn snapshot_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.storage)? {
            let entry = entry?;
            if entry.path().join(SNAPSHOT_METADATA_FILE).is_file() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Metadata of every readable snapshot, newest first.
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotMetadata>> {
        let mut snapshots: Vec<SnapshotMetadata> = self
            .snapshot_ids()?
            .iter()
            .filter_map(|id| {
                let meta = self.read_metadata(id);
                if meta.is_none() {
                    debug!("Skipping unreadable snapshot {id}");
                }
                meta
            })
            .collect();
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// True if the snapshot's metadata parses and its files directory exists.
    pub fn verify_snapshot(&self, id: &str) -> bool {
        match self.snapshot_dir(id) {
            Some(dir) => dir.join(SNAPSHOT_FILES_DIR).is_dir() && self.read_metadata(id).is_some(),
            None => false,
        }
    }

    /// Restores the working tree to snapshot `id`.
    ///
    /// Returns `Ok(false)` without touching anything when the snapshot is
    /// missing or damaged. A dry run only checks the snapshot. Files are
    /// restored even when the version control steps fail; that failure is
    /// returned afterwards as `Error::SnapshotError`.
    pub fn rollback_to(&self, id: &str, dry_run: bool) -> Result<bool> {
        if !self.verify_snapshot(id) {
            warn!("Snapshot {id} is missing or damaged");
            return Ok(false);
        }
        let (Some(dir), Some(meta)) = (self.snapshot_dir(id), self.read_metadata(id)) else {
            return Ok(false);
        };
        if dry_run {
            info!(
                "Would roll back to {id} ('{}', branch '{}', commit '{}')",
                meta.operation, meta.branch, meta.commit
            );
            return Ok(true);
        }

        let vcs_result = if !meta.branch.is_empty() && !meta.commit.is_empty() {
            self.restore_vcs_state(&meta)
        } else {
            Ok(())
        };
        if let Err(e) = &vcs_result {
            warn!("Version control restore for {id} failed: {e}; restoring files anyway");
        }

        let mut restored = 0;
        for entry in TreeWalk::new(dir.join(SNAPSHOT_FILES_DIR)).iter() {
            let entry = entry?;
            copy_entry(&entry.path, entry.kind, &self.root.join(&entry.relative))?;
            restored += 1;
        }
        info!("Rolled back to {id}: {restored} file(s) restored");

        match vcs_result {
            Ok(()) => Ok(true),
            Err(e) => Err(Error::SnapshotError(format!(
                "{restored} file(s) restored from {id}, but branch '{}' at '{}' could not be restored: {e}",
                meta.branch, meta.commit
            ))),
        }
    }

    /// Checks out the recorded branch, resets to its commit and cleans
    /// untracked files, stopping at the first failing step.
    fn restore_vcs_state(&self, meta: &SnapshotMetadata) -> Result<()> {
        self.vcs.checkout(&meta.branch)?;
        self.vcs.reset_hard(&meta.commit)?;
        self.vcs.clean_untracked(&[PathBuf::from(SNAPSHOT_DIR)])
    }

    /// Rolls back to the `steps`-th newest snapshot; 0 is the latest.
    pub fn rollback_steps(&self, steps: usize, dry_run: bool) -> Result<bool> {
        let snapshots = self.list_snapshots()?;
        match snapshots.get(steps) {
            Some(meta) => self.rollback_to(&meta.timestamp, dry_run),
            None => Err(Error::SnapshotError(format!(
                "cannot go back {} step(s): {} snapshot(s) available",
                steps,
                snapshots.len()
            ))),
        }
    }

    /// Removes the oldest snapshots beyond the retention limit.
    pub fn cleanup_old_snapshots(&self) -> Result<usize> {
        let ids = self.snapshot_ids()?;
        if ids.len() <= self.max_history {
            return Ok(0);
        }
        let excess = ids.len() - self.max_history;
        for id in &ids[..excess] {
            let dir = self.storage.join(id);
            if let Err(e) = fs::remove_dir_all(&dir) {
                warn!("Could not remove snapshot {id}: {e}");
            } else {
                debug!("Pruned snapshot {id}");
            }
        }
        Ok(excess)
    }

    /// Snapshot, run `f`, and roll back if it fails. The error is returned unchanged.
    pub fn run_guarded<T, F>(&self, operation: &str, config: serde_json::Value, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let id = self.create_snapshot(operation, config)?;
        match f() {
            Ok(value) => Ok(value),
            Err(err) => {
                error!("'{operation}' failed: {err}; rolling back to {id}");
                match self.rollback_to(&id, false) {
                    Ok(true) => info!("Rollback to {id} complete"),
                    Ok(false) => error!("Snapshot {id} is unusable; nothing restored"),
                    Err(e) => error!("Rollback to {id} failed: {e}"),
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::Untracked;

    #[test]
    fn test_snapshot_dir_rejects_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path(), 3, Box::new(Untracked)).unwrap();
        assert!(store.snapshot_dir("../etc").is_none());
        assert!(store.snapshot_dir("a/b").is_none());
        assert!(store.snapshot_dir("").is_none());
        assert!(store.snapshot_dir("20260101T000000000000Z").is_some());
    }

    #[test]
    fn test_untracked_snapshot_is_empty_but_valid() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path(), 3, Box::new(Untracked)).unwrap();
        let id = store.create_snapshot("inject", serde_json::json!({})).unwrap();
        assert!(store.verify_snapshot(&id));
        let meta = &store.list_snapshots().unwrap()[0];
        assert_eq!(meta.branch, "");
        assert!(meta.dirty_files.is_empty());
    }
}
