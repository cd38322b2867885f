// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Taxonomy layout.
//!
//! The __taxonomy__ is the single configuration document that tells tagroute
//! where content lives, which downstream repositories exist, and which tags
//! route files into each of them.
//!
//! # General Layout
//!
//! A taxonomy is composed of three parts: settings, destinations, and tag
//! assignments. Settings describe the content tree and the local workspace.
//! Destinations map an alias to a remote repository. Tag assignments map an
//! alias to the list of tags whose files belong to that destination.
//!
//! ```toml
//! [settings]
//! content_root = "~/vault"
//!
//! [destinations.site]
//! remote = "owner/site"
//!
//! [[tag_map]]
//! site = ["blog", "notes/public"]
//! ```
//!
//! The same layout is accepted as YAML when the taxonomy file ends in `.yaml`
//! or `.yml`.
//!
//! # Leniency
//!
//! Individual destinations or tag assignments that are malformed are skipped
//! with a warning rather than failing the whole document. Only a taxonomy
//! without a single usable destination is rejected outright.

use crate::{
    path::default_workspace_dir,
    tag::{Tag, TagIndex},
};

use serde::{de::IgnoredAny, Deserialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument, warn};

/// Default listing of text-like file extensions scanned for tags.
pub const DEFAULT_EXTENSIONS: [&str; 15] = [
    "txt", "md", "py", "yaml", "yml", "json", "cfg", "ini", "csv", "log", "xml", "html", "htm",
    "js", "css",
];

/// Default commit message for mirror snapshots.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Automated dispatch update";

/// Fully loaded taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    /// General settings.
    pub settings: Settings,

    /// Destinations keyed by alias.
    pub destinations: BTreeMap<String, Destination>,

    /// Known tags and where they route to.
    pub tags: TagIndex,
}

impl Taxonomy {
    /// Load taxonomy from file.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything else
    /// as TOML.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] or [`ConfigError::Yaml`] if the
    ///   document is not valid at all.
    /// - Return [`ConfigError::NoDestinations`] if no usable destination
    ///   remains.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load taxonomy {:?}", path.display());
        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.to_path_buf(),
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml(&data)
        } else {
            data.parse()
        }
    }

    /// Parse taxonomy from YAML text.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Yaml`] if the document is not valid YAML.
    /// - Return [`ConfigError::NoDestinations`] if no usable destination
    ///   remains.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let raw: RawTaxonomy = serde_yaml::from_str(data)?;
        raw.validate()
    }

    /// Destination working directory, either explicit or inside workspace.
    pub fn workdir(&self, destination: &Destination) -> PathBuf {
        match &destination.path {
            Some(path) => path.clone(),
            None => self.settings.workspace.join(&destination.alias),
        }
    }
}

impl FromStr for Taxonomy {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let raw: RawTaxonomy = toml::de::from_str(data)?;
        raw.validate()
    }
}

/// General taxonomy settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of content tree to scan for tags.
    pub content_root: PathBuf,

    /// Directory holding destination working directories.
    pub workspace: PathBuf,

    /// File extensions eligible for tag scanning.
    pub extensions: Vec<String>,

    /// Visibility of remotes created by tagroute.
    pub visibility: Visibility,

    /// Message used for mirror snapshot commits.
    pub commit_message: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            content_root: PathBuf::from("."),
            workspace: default_workspace_dir().unwrap_or_else(|_| PathBuf::from("tagroute-workspace")),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
            visibility: Visibility::default(),
            commit_message: DEFAULT_COMMIT_MESSAGE.into(),
        }
    }
}

/// Visibility of newly created remotes.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn is_private(self) -> bool {
        matches!(self, Self::Private)
    }
}

/// Downstream repository target.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Destination {
    /// Unique alias of destination.
    pub alias: String,

    /// Remote repository in `owner/name` form.
    pub remote: RepoSlug,

    /// Explicit working directory, otherwise `<workspace>/<alias>`.
    pub path: Option<PathBuf>,

    /// Stamp an existing remote with the ownership marker if it lacks one.
    pub adopt: bool,
}

/// Remote repository name in `owner/name` form.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct RepoSlug {
    owner: String,
    name: String,
}

impl RepoSlug {
    /// Construct new repository slug.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl FromStr for RepoSlug {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let data = data.trim();
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };

        match data.split_once('/') {
            Some((owner, name)) if valid(owner) && valid(name) => Ok(Self::new(owner, name)),
            _ => Err(ConfigError::InvalidRemote(data.to_string())),
        }
    }
}

impl Display for RepoSlug {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}/{}", self.owner, self.name)
    }
}

/// Raw taxonomy as found on disk, before per-entry validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTaxonomy {
    settings: Settings,

    #[serde(alias = "repos")]
    destinations: BTreeMap<String, Lenient<RawDestination>>,

    tag_map: Vec<Lenient<BTreeMap<String, Lenient<Vec<String>>>>>,
}

#[derive(Debug, Deserialize)]
struct RawDestination {
    #[serde(alias = "url")]
    remote: String,
    path: Option<String>,
    #[serde(default)]
    adopt: bool,
}

/// Accept any shape, remembering whether it matched the expected one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Valid(T),
    Malformed(IgnoredAny),
}

impl RawTaxonomy {
    fn validate(self) -> Result<Taxonomy> {
        let mut settings = self.settings;

        // INVARIANT: Perform shell expansion on every path setting.
        settings.content_root = expand_path(&settings.content_root)?;
        settings.workspace = expand_path(&settings.workspace)?;
        settings.extensions = settings
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let mut destinations = BTreeMap::new();
        for (alias, entry) in self.destinations {
            let Lenient::Valid(raw) = entry else {
                warn!("skipping malformed destination {alias:?}");
                continue;
            };

            let remote = match raw.remote.parse::<RepoSlug>() {
                Ok(remote) => remote,
                Err(error) => {
                    warn!("skipping destination {alias:?}: {error}");
                    continue;
                }
            };

            let path = match raw.path.as_deref().map(|path| expand_path(Path::new(path))) {
                Some(Ok(path)) => Some(path),
                Some(Err(error)) => {
                    warn!("skipping destination {alias:?}: {error}");
                    continue;
                }
                None => None,
            };

            destinations.insert(
                alias.clone(),
                Destination {
                    alias,
                    remote,
                    path,
                    adopt: raw.adopt,
                },
            );
        }

        if destinations.is_empty() {
            return Err(ConfigError::NoDestinations);
        }

        let mut tags = TagIndex::new();
        for (position, entry) in self.tag_map.into_iter().enumerate() {
            let Lenient::Valid(assignment) = entry else {
                warn!("skipping malformed tag_map entry #{}", position + 1);
                continue;
            };

            for (alias, raw_tags) in assignment {
                let Lenient::Valid(raw_tags) = raw_tags else {
                    warn!("skipping invalid tag list for {alias:?}");
                    continue;
                };

                if !destinations.contains_key(&alias) {
                    warn!("skipping tags for unknown destination {alias:?}");
                    continue;
                }

                for raw_tag in raw_tags {
                    match Tag::parse(&raw_tag) {
                        Ok(tag) => tags.insert(tag, alias.as_str()),
                        Err(error) => warn!("skipping tag for {alias:?}: {error}"),
                    }
                }
            }
        }

        if tags.is_empty() {
            warn!("taxonomy assigns no tags, no file will be routed");
        }

        Ok(Taxonomy {
            settings,
            destinations,
            tags,
        })
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(path.to_string_lossy().as_ref())
        .map_err(ConfigError::ShellExpansion)?
        .into_owned();

    Ok(PathBuf::from(expanded))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read taxonomy file.
    #[error("failed to read taxonomy at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize TOML taxonomy.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to deserialize YAML taxonomy.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to perform shell expansion on a path setting.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Remote is not in `owner/name` form.
    #[error("remote {0:?} is not in owner/name form")]
    InvalidRemote(String),

    /// Taxonomy has nothing to dispatch to.
    #[error("taxonomy defines no usable destination")]
    NoDestinations,
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
