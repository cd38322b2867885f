// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Destination mirroring.
//!
//! Every destination is a downstream repository that tagroute rebuilds from
//! scratch on each run. Mirroring a destination happens in two stages.
//!
//! # Local Synchronization
//!
//! The destination's local working directory is made an exact mirror of the
//! files resolved for it, then committed as a single snapshot. See
//! [`sync::Synchronizer`].
//!
//! # Guarded Push
//!
//! The snapshot is mirror-pushed to the remote, replacing its entire history.
//! Because that is destructive, the push only happens when the remote carries
//! the ownership marker in its description. See [`gate::Gatekeeper`].
//!
//! # Collaborators
//!
//! Both stages talk to the outside world only through two traits: the
//! [`vcs::VersionControl`] backend for local repositories and pushes, and the
//! [`hosting::HostingProvider`] for remote metadata. Credentials are injected
//! into their implementations at construction time.
//!
//! # Limitations
//!
//! Two tagroute runs targeting the same destination at the same time race on
//! both the working directory and the remote. No locking is attempted.

pub mod gate;
pub mod hosting;
pub mod sync;
pub mod vcs;

pub use gate::{Bootstrap, Gatekeeper, PushOutcome, OWNERSHIP_MARKER};
pub use hosting::{GitHub, HostingProvider};
pub use sync::{SyncReport, Synchronizer};
pub use vcs::{CommitOutcome, Git2Backend, VersionControl};
