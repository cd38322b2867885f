// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations for the taxonomy file and the workspace that
//! holds each destination's local working directory.

use std::path::PathBuf;

/// Default taxonomy file name, looked up in the current directory.
pub const DEFAULT_TAXONOMY: &str = "tagroute.toml";

/// Determine default absolute path to workspace directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/tagroute-workspace` as the
/// default absolute path for the workspace. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if data directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_workspace_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("tagroute-workspace"))
        .ok_or(NoWayHome)
}

/// No way to determine user's data directory.
///
/// # See Also
///
/// - [`dirs::data_dir`](https://docs.rs/dirs/latest/dirs/fn.data_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's data directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
