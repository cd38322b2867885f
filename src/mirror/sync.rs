// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Exact-mirror synchronization.
//!
//! Make a destination's working directory hold exactly the files resolved for
//! it. Synchronization is a full mirror rather than an incremental diff:
//! every extraneous entry is removed, every desired file is copied fresh from
//! the content tree, and the result is committed as one snapshot.
//!
//! # Post-Condition
//!
//! Once [`Synchronizer::sync`] returns successfully, the files tracked by the
//! working directory are set-equal to the desired set. The synchronizer checks
//! this against the backend's index before returning, so a destination that
//! failed to converge is never handed over for pushing.

use crate::mirror::vcs::{CommitOutcome, VcsError, VersionControl};

use filetime::{set_file_times, FileTime};
use std::{
    collections::BTreeSet,
    fs::{copy, create_dir_all, metadata, read_dir, remove_dir_all, remove_file},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Summary of one synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Number of files copied from content tree.
    pub copied: usize,

    /// Number of extraneous entries removed.
    pub removed: usize,

    /// Whether a new snapshot was committed.
    pub commit: CommitOutcome,
}

/// Mirrors resolved file sets into destination working directories.
#[derive(Debug)]
pub struct Synchronizer<'a, V>
where
    V: VersionControl,
{
    vcs: &'a V,
    content_root: &'a Path,
    message: &'a str,
}

impl<'a, V> Synchronizer<'a, V>
where
    V: VersionControl,
{
    /// Construct new synchronizer copying from target content root.
    pub fn new(vcs: &'a V, content_root: &'a Path, message: &'a str) -> Self {
        Self {
            vcs,
            content_root,
            message,
        }
    }

    /// Make working directory an exact mirror of desired file set.
    ///
    /// Creates and initializes the working directory if needed. Desired paths
    /// are relative to both the content root and the working directory.
    ///
    /// # Errors
    ///
    /// - Return [`SyncError::Prepare`] if working directory cannot be created.
    /// - Return [`SyncError::Remove`] if an extraneous entry cannot be removed.
    /// - Return [`SyncError::Copy`] if a desired file cannot be copied.
    /// - Return [`SyncError::Vcs`] if staging or committing fails.
    /// - Return [`SyncError::Diverged`] if tracked files do not match the
    ///   desired set afterwards.
    #[instrument(skip(self, workdir, desired), level = "debug")]
    pub fn sync(&self, workdir: &Path, desired: &BTreeSet<PathBuf>) -> Result<SyncReport> {
        self.prepare(workdir)?;
        if desired.is_empty() {
            warn!("no files resolved for {:?}, mirror will be emptied", workdir.display());
        }

        // INVARIANT: Every ancestor of a desired file must survive pruning.
        let keep_dirs = desired
            .iter()
            .flat_map(|path| path.ancestors().skip(1))
            .filter(|path| !path.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect::<BTreeSet<_>>();

        let removed = prune(workdir, Path::new(""), desired, &keep_dirs)?;
        let mut copied = 0;
        for relative in desired {
            self.copy_entry(workdir, relative)?;
            copied += 1;
        }

        let commit = self.vcs.stage_and_commit(workdir, self.message)?;
        let tracked = self.vcs.tracked_files(workdir)?;
        if &tracked != desired {
            return Err(SyncError::Diverged {
                workdir: workdir.to_path_buf(),
                extra: tracked.difference(desired).cloned().collect(),
                missing: desired.difference(&tracked).cloned().collect(),
            });
        }

        info!(
            "{:?}: {copied} files included, {removed} entries removed",
            workdir.display()
        );

        Ok(SyncReport {
            copied,
            removed,
            commit,
        })
    }

    fn prepare(&self, workdir: &Path) -> Result<()> {
        create_dir_all(workdir).map_err(|err| SyncError::Prepare {
            source: err,
            path: workdir.to_path_buf(),
        })?;

        if !self.vcs.is_repository(workdir) {
            self.vcs.init(workdir)?;
        }

        Ok(())
    }

    fn copy_entry(&self, workdir: &Path, relative: &Path) -> Result<()> {
        let source = self.content_root.join(relative);
        let target = workdir.join(relative);
        let copy_error = |err| SyncError::Copy {
            source: err,
            from: source.clone(),
            to: target.clone(),
        };

        if let Some(parent) = target.parent() {
            create_dir_all(parent).map_err(copy_error)?;
        }

        copy(&source, &target).map_err(copy_error)?;

        // INVARIANT: Preserve timestamps of the original file.
        let meta = metadata(&source).map_err(copy_error)?;
        let atime = FileTime::from_last_access_time(&meta);
        let mtime = FileTime::from_last_modification_time(&meta);
        set_file_times(&target, atime, mtime).map_err(copy_error)?;
        debug!("copied {:?}", relative.display());

        Ok(())
    }
}

/// Remove every entry below `dir` that is neither desired nor needed to hold
/// a desired file. Version-control metadata at the top-level is left alone.
fn prune(
    root: &Path,
    dir: &Path,
    desired: &BTreeSet<PathBuf>,
    keep_dirs: &BTreeSet<PathBuf>,
) -> Result<usize> {
    let current = root.join(dir);
    let entries = read_dir(&current).map_err(|err| SyncError::Remove {
        source: err,
        path: current.clone(),
    })?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|err| SyncError::Remove {
            source: err,
            path: current.clone(),
        })?;
        let relative = dir.join(entry.file_name());
        if dir.as_os_str().is_empty() && entry.file_name() == ".git" {
            continue;
        }

        let path = entry.path();
        let remove_error = |err| SyncError::Remove {
            source: err,
            path: path.clone(),
        };
        let kind = entry.file_type().map_err(remove_error)?;
        if kind.is_dir() {
            if keep_dirs.contains(&relative) {
                removed += prune(root, &relative, desired, keep_dirs)?;
            } else {
                remove_dir_all(&path).map_err(remove_error)?;
                removed += 1;
            }
        } else if !desired.contains(&relative) {
            remove_file(&path).map_err(remove_error)?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Working directory cannot be created.
    #[error("failed to prepare working directory {:?}", path.display())]
    Prepare {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Extraneous entry cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Desired file cannot be copied into working directory.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Version-control operation fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// Tracked files differ from desired set after synchronization.
    #[error("{:?} is not an exact mirror: extra {extra:?}, missing {missing:?}", workdir.display())]
    Diverged {
        workdir: PathBuf,
        extra: Vec<PathBuf>,
        missing: Vec<PathBuf>,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::vcs::Git2Backend;
    use filetime::set_file_mtime;
    use pretty_assertions::assert_eq;
    use std::fs::{read_to_string, write};

    fn set(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    fn plant(root: &Path, files: &[(&str, &str)]) {
        for (path, contents) in files {
            let path = root.join(path);
            create_dir_all(path.parent().unwrap()).unwrap();
            write(path, contents).unwrap();
        }
    }

    fn listing(root: &Path) -> BTreeSet<PathBuf> {
        let mut files = BTreeSet::new();
        let mut stack = vec![PathBuf::new()];
        while let Some(dir) = stack.pop() {
            for entry in read_dir(root.join(&dir)).unwrap() {
                let entry = entry.unwrap();
                let relative = dir.join(entry.file_name());
                if relative == Path::new(".git") {
                    continue;
                }
                if entry.file_type().unwrap().is_dir() {
                    stack.push(relative);
                } else {
                    files.insert(relative);
                }
            }
        }
        files
    }

    #[test]
    fn sync_removes_stale_and_copies_desired() -> anyhow::Result<()> {
        let content = tempfile::tempdir()?;
        let workspace = tempfile::tempdir()?;
        let workdir = workspace.path().join("docs");
        plant(
            content.path(),
            &[("guide.md", "new guide"), ("api/ref.md", "ref"), ("skip.md", "skip")],
        );
        plant(
            &workdir,
            &[
                ("old.md", "stale"),
                ("guide.md", "old guide"),
                ("api/removed.md", "stale"),
                ("gone/deep/file.md", "stale"),
            ],
        );

        let backend = Git2Backend::anonymous();
        let sync = Synchronizer::new(&backend, content.path(), "update");
        let desired = set(&["guide.md", "api/ref.md"]);
        let report = sync.sync(&workdir, &desired)?;

        assert_eq!(listing(&workdir), desired);
        assert_eq!(backend.tracked_files(&workdir)?, desired);
        assert_eq!(read_to_string(workdir.join("guide.md"))?, "new guide");
        assert!(!workdir.join("old.md").exists());
        assert!(!workdir.join("gone").exists());
        assert_eq!(report.copied, 2);
        assert_eq!(report.removed, 3);
        assert!(matches!(report.commit, CommitOutcome::Committed(_)));

        Ok(())
    }

    #[test]
    fn sync_unchanged_content_commits_nothing() -> anyhow::Result<()> {
        let content = tempfile::tempdir()?;
        let workspace = tempfile::tempdir()?;
        let workdir = workspace.path().join("site");
        plant(content.path(), &[("post.md", "#blog")]);

        let backend = Git2Backend::anonymous();
        let sync = Synchronizer::new(&backend, content.path(), "update");
        let desired = set(&["post.md"]);
        sync.sync(&workdir, &desired)?;
        let report = sync.sync(&workdir, &desired)?;

        assert_eq!(report.commit, CommitOutcome::NoChanges);
        assert_eq!(report.removed, 0);

        Ok(())
    }

    #[test]
    fn sync_preserves_timestamps() -> anyhow::Result<()> {
        let content = tempfile::tempdir()?;
        let workspace = tempfile::tempdir()?;
        let workdir = workspace.path().join("site");
        plant(content.path(), &[("post.md", "#blog")]);
        let mtime = FileTime::from_unix_time(1_000_000_000, 0);
        set_file_mtime(content.path().join("post.md"), mtime)?;

        let backend = Git2Backend::anonymous();
        Synchronizer::new(&backend, content.path(), "update").sync(&workdir, &set(&["post.md"]))?;

        let copied = metadata(workdir.join("post.md"))?;
        assert_eq!(FileTime::from_last_modification_time(&copied), mtime);

        Ok(())
    }

    #[test]
    fn sync_replaces_directory_with_file_and_back() -> anyhow::Result<()> {
        let content = tempfile::tempdir()?;
        let workspace = tempfile::tempdir()?;
        let workdir = workspace.path().join("site");
        plant(content.path(), &[("notes", "now a file")]);
        plant(&workdir, &[("notes/inner.md", "was a dir")]);

        let backend = Git2Backend::anonymous();
        let sync = Synchronizer::new(&backend, content.path(), "update");
        sync.sync(&workdir, &set(&["notes"]))?;
        assert_eq!(listing(&workdir), set(&["notes"]));

        Ok(())
    }

    #[test]
    fn sync_empty_set_empties_mirror() -> anyhow::Result<()> {
        let content = tempfile::tempdir()?;
        let workspace = tempfile::tempdir()?;
        let workdir = workspace.path().join("site");
        plant(&workdir, &[("old.md", "stale")]);

        let backend = Git2Backend::anonymous();
        let report = Synchronizer::new(&backend, content.path(), "update")
            .sync(&workdir, &BTreeSet::new())?;

        assert!(listing(&workdir).is_empty());
        assert_eq!(report.commit, CommitOutcome::NoChanges);
        assert_eq!(report.removed, 1);

        Ok(())
    }

    #[test]
    fn sync_missing_source_fails() -> anyhow::Result<()> {
        let content = tempfile::tempdir()?;
        let workspace = tempfile::tempdir()?;
        let workdir = workspace.path().join("site");

        let backend = Git2Backend::anonymous();
        let result = Synchronizer::new(&backend, content.path(), "update")
            .sync(&workdir, &set(&["ghost.md"]));
        assert!(matches!(result, Err(SyncError::Copy { .. })));

        Ok(())
    }
}
