// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Route tagged content into independently versioned repositories.
//!
//! Tagroute reads a taxonomy of destinations and tags, resolves which files of
//! a content tree belong to which destination by the hierarchical `#tags`
//! embedded in them, rebuilds each destination as an exact mirror of its file
//! set, and mirror-pushes it to a remote that tagroute is known to own.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod mirror;
pub mod path;
pub mod resolve;
pub mod tag;

pub use auth::Credential;
pub use config::{Destination, RepoSlug, Taxonomy};
pub use dispatch::{DispatchOptions, DispatchReport, Dispatcher, Outcome};
pub use resolve::{Resolution, Resolver};
pub use tag::{Tag, TagIndex};
