// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote ownership gating.
//!
//! A mirror push replaces every ref of the remote, so pushing to the wrong
//! repository destroys its history. Tagroute only ever pushes to remotes that
//! carry the [`OWNERSHIP_MARKER`] in their description.
//!
//! # Bootstrap Versus Verification
//!
//! Stamping the marker and checking for it are kept apart on purpose.
//! [`Gatekeeper::ensure_exists_and_managed`] is an explicit bootstrap step
//! that claims a remote. [`Gatekeeper::verify_managed`] is a read-only check
//! with no side effects. A destination alias that was misconfigured to point
//! at an unrelated repository is therefore still caught, unless the caller
//! deliberately chose to claim it.

use crate::{
    auth::redact_url,
    config::{RepoSlug, Visibility},
    mirror::{
        hosting::{HostingError, HostingProvider},
        vcs::{VcsError, VersionControl},
    },
};

use std::path::Path;
use tracing::{info, instrument, warn};

/// Sentinel text marking a remote as owned by tagroute.
pub const OWNERSHIP_MARKER: &str = "Managed by tagroute";

/// Separator placed between an existing description and the marker.
pub const MARKER_SEPARATOR: &str = " | ";

/// What bootstrapping did to a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    /// Remote was missing, so it was created and stamped.
    Created,

    /// Remote existed without marker, so marker was appended.
    Stamped,

    /// Remote already carried the marker.
    AlreadyManaged,

    /// Remote existed and was left untouched.
    Existing,
}

/// Result of a guarded push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Remote was overwritten with the local mirror.
    Pushed,

    /// Remote lacks the ownership marker, nothing was pushed.
    Unmanaged,
}

/// Guards every destructive operation on remotes behind the ownership marker.
#[derive(Debug)]
pub struct Gatekeeper<'a, H, V>
where
    H: HostingProvider,
    V: VersionControl,
{
    hosting: &'a H,
    vcs: &'a V,
    visibility: Visibility,
}

impl<'a, H, V> Gatekeeper<'a, H, V>
where
    H: HostingProvider,
    V: VersionControl,
{
    /// Construct new gatekeeper.
    pub fn new(hosting: &'a H, vcs: &'a V, visibility: Visibility) -> Self {
        Self {
            hosting,
            vcs,
            visibility,
        }
    }

    /// Make sure remote exists, and claim it with the ownership marker.
    ///
    /// Creates missing remotes with the configured visibility and stamps them.
    /// Existing remotes without the marker get it appended to their current
    /// description. No other metadata is touched.
    ///
    /// # Errors
    ///
    /// - Return [`GateError::Hosting`] if any provider operation fails.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_exists_and_managed(&self, remote: &RepoSlug) -> Result<Bootstrap> {
        if !self.hosting.exists(remote)? {
            return self.create_and_stamp(remote);
        }

        let description = self.hosting.get_description(remote)?;
        if description.contains(OWNERSHIP_MARKER) {
            return Ok(Bootstrap::AlreadyManaged);
        }

        let stamped = stamp(&description);
        info!("claim {remote}, description becomes {stamped:?}");
        self.hosting.set_description(remote, &stamped)?;

        Ok(Bootstrap::Stamped)
    }

    /// Make sure remote exists, creating and stamping it if missing.
    ///
    /// Unlike [`Gatekeeper::ensure_exists_and_managed`], an existing remote is
    /// never modified.
    ///
    /// # Errors
    ///
    /// - Return [`GateError::Hosting`] if any provider operation fails.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_exists(&self, remote: &RepoSlug) -> Result<Bootstrap> {
        if !self.hosting.exists(remote)? {
            return self.create_and_stamp(remote);
        }

        Ok(Bootstrap::Existing)
    }

    /// Check if remote carries the ownership marker.
    ///
    /// # Errors
    ///
    /// - Return [`GateError::Hosting`] if description cannot be read.
    pub fn verify_managed(&self, remote: &RepoSlug) -> Result<bool> {
        Ok(self
            .hosting
            .get_description(remote)?
            .contains(OWNERSHIP_MARKER))
    }

    /// Mirror local working directory to remote, if remote is managed.
    ///
    /// Reads the remote description right before pushing. An unmanaged remote
    /// is reported as [`PushOutcome::Unmanaged`], which is not an error.
    ///
    /// # Errors
    ///
    /// - Return [`GateError::Hosting`] if description cannot be read.
    /// - Return [`GateError::Vcs`] if the mirror push fails.
    #[instrument(skip(self, workdir), level = "debug")]
    pub fn guarded_push(&self, workdir: &Path, remote: &RepoSlug) -> Result<PushOutcome> {
        if !self.verify_managed(remote)? {
            warn!("refusing to push to {remote}, it lacks {OWNERSHIP_MARKER:?}");
            return Ok(PushOutcome::Unmanaged);
        }

        let url = self.hosting.push_url(remote);
        info!("push mirror of {remote} to {}", redact_url(&url));
        self.vcs.push_mirror(workdir, &url)?;

        Ok(PushOutcome::Pushed)
    }

    fn create_and_stamp(&self, remote: &RepoSlug) -> Result<Bootstrap> {
        info!("create {remote} as {:?}", self.visibility);
        self.hosting.create(remote, self.visibility)?;
        self.hosting.set_description(remote, OWNERSHIP_MARKER)?;

        Ok(Bootstrap::Created)
    }
}

/// Append ownership marker to a description, keeping prior text verbatim.
pub fn stamp(description: &str) -> String {
    if description.is_empty() {
        OWNERSHIP_MARKER.to_string()
    } else {
        format!("{description}{MARKER_SEPARATOR}{OWNERSHIP_MARKER}")
    }
}

/// Gatekeeping error types.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Hosting provider operation fails.
    #[error(transparent)]
    Hosting(#[from] HostingError),

    /// Version-control operation fails.
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// Friendly result alias :3
pub type Result<T, E = GateError> = std::result::Result<T, E>;
