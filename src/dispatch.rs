// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dispatch orchestration.
//!
//! A dispatch run resolves the content tree once, then walks every
//! destination one at a time in alias order. Each destination moves through
//! the following states:
//!
//! ```text
//! Unverified -> Verified-Managed -> Synchronized -> Pushed
//!          \                \                  \-> Skipped(unmanaged)
//!           \                \-> Failed          \-> Failed
//!            \-> Skipped(unmanaged) | Failed
//! ```
//!
//! A destination that no file routes to, and that was never mirrored before,
//! ends as `Empty` before any remote is contacted.
//!
//! No destination reaches `Pushed` without first being verified as managed.
//! Unverified remotes are only claimed when the destination opts in through
//! `adopt`, or when they did not exist and tagroute just created them.
//!
//! By default the first error aborts the remaining destinations. With
//! [`DispatchOptions::keep_going`] every failure is recorded in the report
//! and the run moves on to the next destination.

use crate::{
    config::{Destination, Taxonomy},
    mirror::{
        gate::{GateError, Gatekeeper, PushOutcome},
        hosting::HostingProvider,
        sync::{SyncError, SyncReport, Synchronizer},
        vcs::VersionControl,
    },
    resolve::{ResolveError, Resolution, Resolver},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, error, info, instrument, warn};

/// Knobs for a dispatch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Record per-destination failures and continue with the next one.
    pub keep_going: bool,

    /// Claim every existing remote, as if each destination set `adopt`.
    pub adopt: bool,
}

/// Terminal state of a destination within one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Local mirror built and pushed to managed remote.
    Pushed(SyncReport),

    /// Local mirror built, remote left alone on purpose.
    Synced(SyncReport),

    /// Remote lacks ownership marker, nothing was done to it.
    Skipped,

    /// No file routes to destination and it was never mirrored before.
    Empty,

    /// Destination failed, with reason.
    Failed(String),
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Pushed(report) => write!(
                fmt,
                "pushed ({} files, {} removed)",
                report.copied, report.removed
            ),
            Self::Synced(report) => write!(
                fmt,
                "synchronized locally ({} files, {} removed)",
                report.copied, report.removed
            ),
            Self::Skipped => fmt.write_str("skipped, remote is not managed by tagroute"),
            Self::Empty => fmt.write_str("nothing to mirror, no file routes here"),
            Self::Failed(reason) => write!(fmt, "failed: {reason}"),
        }
    }
}

/// Outcome of every processed destination, in processing order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    outcomes: Vec<(String, Outcome)>,
}

impl DispatchReport {
    /// Outcome of target destination, if it was processed.
    pub fn outcome(&self, alias: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, outcome)| outcome)
    }

    /// Iterate over destinations and outcomes in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.outcomes
            .iter()
            .map(|(alias, outcome)| (alias.as_str(), outcome))
    }

    /// Check if any destination failed.
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, Outcome::Failed(_)))
    }

    fn record(&mut self, alias: &str, outcome: Outcome) {
        self.outcomes.push((alias.to_string(), outcome));
    }
}

impl Display for DispatchReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for (alias, outcome) in &self.outcomes {
            writeln!(fmt, "{alias}: {outcome}")?;
        }

        Ok(())
    }
}

/// Drives resolution, synchronization, and guarded pushes for a taxonomy.
#[derive(Debug)]
pub struct Dispatcher<'a, V>
where
    V: VersionControl,
{
    taxonomy: &'a Taxonomy,
    vcs: &'a V,
    options: DispatchOptions,
}

impl<'a, V> Dispatcher<'a, V>
where
    V: VersionControl,
{
    /// Construct new dispatcher.
    pub fn new(taxonomy: &'a Taxonomy, vcs: &'a V, options: DispatchOptions) -> Self {
        Self {
            taxonomy,
            vcs,
            options,
        }
    }

    /// Resolve content tree against taxonomy.
    ///
    /// The workspace and every destination working directory are excluded
    /// from the walk, so mirrors never feed back into resolution.
    ///
    /// # Errors
    ///
    /// - Return [`DispatchError::Resolve`] if content root is unusable.
    pub fn resolve(&self) -> Result<Resolution> {
        let settings = &self.taxonomy.settings;
        let mut excluded = vec![settings.workspace.clone()];
        excluded.extend(
            self.taxonomy
                .destinations
                .values()
                .map(|destination| self.taxonomy.workdir(destination)),
        );

        let resolution = Resolver::new(&settings.content_root, &self.taxonomy.tags, &settings.extensions)
            .exclude(excluded)
            .resolve()?;

        Ok(resolution)
    }

    /// Build every local mirror without contacting any remote.
    ///
    /// # Errors
    ///
    /// - Return [`DispatchError::Sync`] on the first failure, unless
    ///   failures are kept going.
    #[instrument(skip(self, resolution), level = "debug")]
    pub fn sync_local(&self, resolution: &Resolution) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        for destination in self.taxonomy.destinations.values() {
            info!("synchronize {} locally", destination.alias);
            let outcome = self
                .synchronize(destination, resolution)
                .map(Outcome::Synced)
                .map_err(|err| DispatchError::Sync {
                    alias: destination.alias.clone(),
                    source: err,
                });
            self.settle(&mut report, destination, outcome)?;
        }

        Ok(report)
    }

    /// Synchronize and push every destination.
    ///
    /// # Errors
    ///
    /// - Return [`DispatchError::Gate`] or [`DispatchError::Sync`] on the
    ///   first failure, unless failures are kept going.
    #[instrument(skip(self, hosting, resolution), level = "debug")]
    pub fn dispatch<H>(&self, hosting: &H, resolution: &Resolution) -> Result<DispatchReport>
    where
        H: HostingProvider,
    {
        let gate = Gatekeeper::new(hosting, self.vcs, self.taxonomy.settings.visibility);
        info!(
            "managing {} destinations",
            self.taxonomy.destinations.len()
        );

        let mut report = DispatchReport::default();
        for destination in self.taxonomy.destinations.values() {
            info!("processing {} ({})", destination.alias, destination.remote);
            let outcome = self.dispatch_one(&gate, destination, resolution);
            self.settle(&mut report, destination, outcome)?;
        }

        Ok(report)
    }

    fn dispatch_one<H>(
        &self,
        gate: &Gatekeeper<'_, H, V>,
        destination: &Destination,
        resolution: &Resolution,
    ) -> Result<Outcome>
    where
        H: HostingProvider,
    {
        let alias = destination.alias.as_str();
        let remote = &destination.remote;

        // INVARIANT: Never claim or create a remote there is nothing to push to.
        let workdir = self.taxonomy.workdir(destination);
        if resolution.files_for(alias).is_empty() && !self.vcs.has_commits(&workdir) {
            warn!("{alias}: no file routes here and no prior mirror exists, leaving {remote} alone");
            return Ok(Outcome::Empty);
        }

        let gate_error = |err| DispatchError::Gate {
            alias: alias.to_string(),
            source: err,
        };

        let bootstrap = if destination.adopt || self.options.adopt {
            gate.ensure_exists_and_managed(remote)
        } else {
            gate.ensure_exists(remote)
        }
        .map_err(gate_error)?;
        debug!("{alias}: bootstrap {bootstrap:?}");

        if !gate.verify_managed(remote).map_err(gate_error)? {
            warn!("{alias}: {remote} is not managed by tagroute, set adopt to claim it");
            return Ok(Outcome::Skipped);
        }
        debug!("{alias}: verified managed");

        let report = self
            .synchronize(destination, resolution)
            .map_err(|err| DispatchError::Sync {
                alias: alias.to_string(),
                source: err,
            })?;
        debug!("{alias}: synchronized");

        match gate.guarded_push(&workdir, remote).map_err(gate_error)? {
            PushOutcome::Pushed => Ok(Outcome::Pushed(report)),
            PushOutcome::Unmanaged => Ok(Outcome::Skipped),
        }
    }

    fn synchronize(
        &self,
        destination: &Destination,
        resolution: &Resolution,
    ) -> Result<SyncReport, SyncError> {
        let settings = &self.taxonomy.settings;
        let synchronizer =
            Synchronizer::new(self.vcs, &settings.content_root, &settings.commit_message);
        let files = resolution.files_for(&destination.alias);

        synchronizer.sync(&self.taxonomy.workdir(destination), &files)
    }

    fn settle(
        &self,
        report: &mut DispatchReport,
        destination: &Destination,
        outcome: Result<Outcome>,
    ) -> Result<()> {
        match outcome {
            Ok(outcome) => {
                info!("{}: {outcome}", destination.alias);
                report.record(&destination.alias, outcome);
            }
            Err(err) if self.options.keep_going => {
                error!("{err:?}");
                report.record(&destination.alias, Outcome::Failed(error_chain(&err)));
            }
            Err(err) => return Err(err),
        }

        Ok(())
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

/// Dispatch error types.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Content tree cannot be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Remote verification, bootstrap, or push fails for a destination.
    #[error("destination {alias:?} failed")]
    Gate {
        alias: String,
        #[source]
        source: GateError,
    },

    /// Local synchronization fails for a destination.
    #[error("destination {alias:?} failed to synchronize")]
    Sync {
        alias: String,
        #[source]
        source: SyncError,
    },
}

/// Friendly result alias :3
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
