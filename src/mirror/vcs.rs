// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version-control backend.
//!
//! The synchronizer and the gatekeeper only ever issue a handful of opaque
//! operations against a working directory: initialize it, snapshot it, list
//! what it tracks, and mirror it to a remote. The [`VersionControl`] trait
//! models exactly those operations, and [`Git2Backend`] implements them
//! through libgit2.

use crate::auth::{redact_url, Credential};

use auth_git2::GitAuthenticator;
use git2::{
    Config, Direction, IndexAddOption, Oid, PushOptions, ReferenceType, Remote, RemoteCallbacks,
    Repository, RepositoryInitOptions, Signature,
};
use std::{
    collections::BTreeSet,
    ffi::OsStr,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Initial branch of freshly initialized working directories.
pub const INITIAL_BRANCH: &str = "main";

const FALLBACK_NAME: &str = "tagroute";
const FALLBACK_EMAIL: &str = "tagroute@localhost";
const TOKEN_USERNAME: &str = "x-access-token";

/// Result of staging and committing a working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// New snapshot recorded.
    Committed(Oid),

    /// Working directory matches last snapshot, nothing recorded.
    NoChanges,
}

/// Opaque version-control operations on a working directory.
pub trait VersionControl {
    /// Initialize working directory as a repository.
    fn init(&self, path: &Path) -> Result<()>;

    /// Check if working directory is already a repository.
    fn is_repository(&self, path: &Path) -> bool;

    /// Check if working directory has at least one commit to mirror.
    fn has_commits(&self, path: &Path) -> bool;

    /// Stage every addition, modification, and deletion, then commit.
    fn stage_and_commit(&self, path: &Path, message: &str) -> Result<CommitOutcome>;

    /// List files currently tracked by the index.
    fn tracked_files(&self, path: &Path) -> Result<BTreeSet<PathBuf>>;

    /// Replace every ref of the remote with the refs of the working directory.
    fn push_mirror(&self, path: &Path, url: &str) -> Result<()>;
}

/// Version control through libgit2.
pub struct Git2Backend {
    authenticator: GitAuthenticator,
}

impl Git2Backend {
    /// Construct new libgit2 backend authenticating with target credential.
    pub fn new(credential: &Credential) -> Self {
        let authenticator = GitAuthenticator::default().add_plaintext_credentials(
            "*",
            TOKEN_USERNAME,
            credential.expose(),
        );

        Self { authenticator }
    }

    /// Construct new libgit2 backend that relies on ambient git credentials.
    pub fn anonymous() -> Self {
        Self {
            authenticator: GitAuthenticator::default(),
        }
    }

    fn callbacks<'a>(&'a self, config: &'a Config) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(self.authenticator.credentials(config));
        callbacks
    }
}

impl VersionControl for Git2Backend {
    #[instrument(skip(self, path), level = "debug")]
    fn init(&self, path: &Path) -> Result<()> {
        info!("initialize working directory {:?}", path.display());
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(INITIAL_BRANCH);
        Repository::init_opts(path, &opts)?;

        Ok(())
    }

    fn is_repository(&self, path: &Path) -> bool {
        path.join(".git").exists() && Repository::open(path).is_ok()
    }

    fn has_commits(&self, path: &Path) -> bool {
        let Ok(repository) = Repository::open(path) else {
            return false;
        };
        let has_commits = repository
            .head()
            .and_then(|head| head.peel_to_commit())
            .is_ok();

        has_commits
    }

    #[instrument(skip(self, path, message), level = "debug")]
    fn stage_and_commit(&self, path: &Path, message: &str) -> Result<CommitOutcome> {
        let repository = Repository::open(path)?;
        let mut index = repository.index()?;

        // INVARIANT: Stage deletions along with additions and modifications.
        //   - Ignore rules never apply, the working directory is an exact mirror.
        index.add_all(["*"], IndexAddOption::FORCE, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        let tree_oid = index.write_tree()?;

        let parent = repository
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let unchanged = match &parent {
            Some(commit) => commit.tree_id() == tree_oid,
            None => index.len() == 0,
        };
        if unchanged {
            debug!("nothing to commit in {:?}", path.display());
            return Ok(CommitOutcome::NoChanges);
        }

        // INVARIANT: Always provide a valid signature, even without user config.
        let signature = repository
            .signature()
            .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))?;
        let tree = repository.find_tree(tree_oid)?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = repository.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!("committed {oid} in {:?}", path.display());

        Ok(CommitOutcome::Committed(oid))
    }

    fn tracked_files(&self, path: &Path) -> Result<BTreeSet<PathBuf>> {
        let repository = Repository::open(path)?;
        let index = repository.index()?;

        Ok(index
            .iter()
            .map(|entry| bytes_to_path(&entry.path).to_path_buf())
            .collect())
    }

    #[instrument(skip(self, path, url), level = "debug")]
    fn push_mirror(&self, path: &Path, url: &str) -> Result<()> {
        let repository = Repository::open(path)?;
        let config = repository.config()?;

        let mut local_refs = BTreeSet::new();
        for reference in repository.references()? {
            let reference = reference?;
            if reference.kind() != Some(ReferenceType::Direct) {
                continue;
            }

            if let Some(name) = reference.name() {
                local_refs.insert(name.to_string());
            }
        }

        // INVARIANT: Never mirror an empty history, it would wipe the remote.
        if local_refs.is_empty() {
            return Err(VcsError::EmptyHistory(path.to_path_buf()));
        }

        let mut remote = repository.remote_anonymous(url)?;
        let refspecs = local_refs
            .iter()
            .map(|name| format!("+{name}:{name}"))
            .collect::<Vec<_>>();
        info!("mirror {:?} to {}", path.display(), redact_url(url));
        self.push(&mut remote, &config, &refspecs, url)?;

        // INVARIANT: Only list remote refs once the remote holds at least one.
        let remote_refs = {
            let connection =
                remote.connect_auth(Direction::Push, Some(self.callbacks(&config)), None)?;
            connection
                .list()?
                .iter()
                .map(|head| head.name().to_string())
                .filter(|name| name.starts_with("refs/"))
                .collect::<BTreeSet<_>>()
        };

        let stale = remote_refs
            .difference(&local_refs)
            .map(|name| format!(":{name}"))
            .collect::<Vec<_>>();
        if !stale.is_empty() {
            debug!("delete remote-only refs {stale:?}");
            self.push(&mut remote, &config, &stale, url)?;
        }

        Ok(())
    }
}

impl Git2Backend {
    fn push(
        &self,
        remote: &mut Remote<'_>,
        config: &Config,
        refspecs: &[String],
        url: &str,
    ) -> Result<()> {
        let mut rejected = Vec::new();
        {
            let mut callbacks = self.callbacks(config);
            callbacks.push_update_reference(|name, status| {
                if let Some(status) = status {
                    rejected.push(format!("{name}: {status}"));
                }
                Ok(())
            });

            let mut opts = PushOptions::new();
            opts.remote_callbacks(callbacks);
            remote.push(refspecs, Some(&mut opts))?;
        }

        if !rejected.is_empty() {
            return Err(VcsError::Rejected {
                remote: redact_url(url),
                refs: rejected,
            });
        }

        Ok(())
    }
}

// Thanks from:
//
// https://github.com/rust-lang/git2-rs/blob/5bc3baa9694a94db2ca9cc256b5bce8a215f9013/
// src/util.rs#L85
#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> &Path {
    use std::os::unix::prelude::*;
    Path::new(OsStr::from_bytes(bytes))
}

#[cfg(windows)]
fn bytes_to_path(bytes: &[u8]) -> &Path {
    Path::new(std::str::from_utf8(bytes).unwrap_or_default())
}

/// Version-control error types.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Working directory has no refs to mirror.
    #[error("refusing to mirror {:?}, it has no commits", .0.display())]
    EmptyHistory(PathBuf),

    /// Remote refused some ref updates.
    #[error("remote {remote} rejected updates: {}", refs.join("; "))]
    Rejected { remote: String, refs: Vec<String> },
}

/// Friendly result alias :3
pub type Result<T, E = VcsError> = std::result::Result<T, E>;
