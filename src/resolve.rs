// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File-to-destination resolution.
//!
//! Walk the content tree, scan every eligible file for tags, and record the
//! destinations each file routes to. Resolution is a pure function of the
//! content tree and the [`TagIndex`]: nothing is cached or persisted between
//! runs, and repeated runs over unchanged input produce identical output.
//!
//! # Eligible Files
//!
//! A file is scanned only if:
//!
//! 1. It does not live inside version-control metadata (`.git`, `.hg`,
//!    `.svn`).
//! 2. It is not hidden, i.e., its name does not start with a dot.
//! 3. Its extension is in the configured allow-list of text-like extensions.
//! 4. It does not live inside an excluded directory, e.g., a destination
//!    working directory nested in the content tree.
//!
//! Files that cannot be read or are not valid UTF-8 are skipped with a
//! warning. They never abort the walk.

use crate::tag::TagIndex;

use ignore::WalkBuilder;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{canonicalize, read_to_string},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Directory names holding version-control metadata.
pub const VCS_DIRS: [&str; 3] = [".git", ".hg", ".svn"];

/// Resolved mapping of content-tree-relative path to sorted destinations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    files: BTreeMap<PathBuf, Vec<String>>,
}

impl Resolution {
    /// Number of routed files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sorted destinations of a routed file.
    pub fn destinations(&self, path: impl AsRef<Path>) -> Option<&[String]> {
        self.files.get(path.as_ref()).map(Vec::as_slice)
    }

    /// Iterate over routed files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &[String])> {
        self.files
            .iter()
            .map(|(path, aliases)| (path.as_path(), aliases.as_slice()))
    }

    /// Every file routed to target destination.
    pub fn files_for(&self, alias: &str) -> BTreeSet<PathBuf> {
        self.files
            .iter()
            .filter(|(_, aliases)| aliases.binary_search_by(|probe| probe.as_str().cmp(alias)).is_ok())
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl Display for Resolution {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        for (path, aliases) in &self.files {
            writeln!(fmt, "{} -> [{}]", path.display(), aliases.join(", "))?;
        }

        Ok(())
    }
}

/// Walks a content tree and routes files through a tag index.
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    root: PathBuf,
    index: &'a TagIndex,
    extensions: BTreeSet<String>,
    excluded: Vec<PathBuf>,
}

impl<'a> Resolver<'a> {
    /// Construct new resolver over content root.
    pub fn new(
        root: impl Into<PathBuf>,
        index: &'a TagIndex,
        extensions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            root: root.into(),
            index,
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().to_ascii_lowercase())
                .collect(),
            excluded: Vec::new(),
        }
    }

    /// Exclude directories from the walk.
    ///
    /// Paths that do not exist yet are ignored, since they cannot hold
    /// content anyway.
    pub fn exclude(mut self, dirs: impl IntoIterator<Item = impl AsRef<Path>>) -> Self {
        self.excluded
            .extend(dirs.into_iter().filter_map(|dir| canonicalize(dir.as_ref()).ok()));
        self
    }

    /// Resolve every eligible file in the content tree.
    ///
    /// # Errors
    ///
    /// - Return [`ResolveError::MissingRoot`] if content root is not a
    ///   directory.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve(&self) -> Result<Resolution> {
        if !self.root.is_dir() {
            return Err(ResolveError::MissingRoot(self.root.clone()));
        }

        info!("resolve content tree {:?}", self.root.display());
        let mut resolution = Resolution::default();
        let excluded = self.excluded.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
                if !is_dir || entry.depth() == 0 {
                    return true;
                }

                let is_vcs = VCS_DIRS.iter().any(|name| entry.file_name() == *name);
                let is_excluded = !excluded.is_empty()
                    && canonicalize(entry.path()).is_ok_and(|path| excluded.contains(&path));
                !(is_vcs || is_excluded)
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("skipping unreadable entry: {error}");
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|kind| kind.is_file()) || !self.is_eligible(entry.path()) {
                continue;
            }

            let aliases = match self.resolve_file(entry.path()) {
                Ok(aliases) => aliases,
                Err(error) => {
                    warn!("{error}");
                    continue;
                }
            };

            if aliases.is_empty() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();
            debug!("{} routes to {aliases:?}", relative.display());
            resolution.files.insert(relative, aliases.into_iter().collect());
        }

        info!("resolved {} routed files", resolution.len());
        Ok(resolution)
    }

    /// Resolve the destinations of a single file.
    ///
    /// # Errors
    ///
    /// - Return [`ContentReadError`] if the file cannot be read as UTF-8 text.
    pub fn resolve_file(&self, path: &Path) -> Result<BTreeSet<String>, ContentReadError> {
        let content = read_to_string(path).map_err(|err| ContentReadError {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(self.index.route(&content))
    }

    fn is_eligible(&self, path: &Path) -> bool {
        let is_hidden = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_none_or(|name| name.starts_with('.'));
        if is_hidden {
            return false;
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// File could not be read or decoded during tag scanning.
#[derive(Debug, thiserror::Error)]
#[error("skipping unreadable file {:?}", path.display())]
pub struct ContentReadError {
    #[source]
    source: std::io::Error,
    path: PathBuf,
}

/// Resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Content root does not exist or is not a directory.
    #[error("content root {:?} is not a directory", .0.display())]
    MissingRoot(PathBuf),
}

/// Friendly result alias :3
pub type Result<T, E = ResolveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, write};

    fn index(routes: &[(&str, &str)]) -> TagIndex {
        let mut index = TagIndex::new();
        for (tag, alias) in routes {
            index.insert(Tag::parse(tag).unwrap(), *alias);
        }
        index
    }

    fn plant(root: &Path, files: &[(&str, &[u8])]) {
        for (path, contents) in files {
            let path = root.join(path);
            create_dir_all(path.parent().unwrap()).unwrap();
            write(path, contents).unwrap();
        }
    }

    #[test]
    fn resolve_content_tree() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        plant(
            root.path(),
            &[
                ("drafts.md", b"wip #blog/drafts"),
                ("post.md", b"hello #Blog"),
                ("nested/deep/both.txt", b"#blog and #docs"),
                ("untagged.md", b"nothing here #123"),
                ("image.png", b"#blog"),
                (".hidden.md", b"#blog"),
                (".git/notes.md", b"#blog"),
                (".obsidian/workspace.json", b"#docs"),
                ("binary.md", &[0xff, 0xfe, b'#', b'b']),
            ],
        );

        let index = index(&[("blog", "site"), ("blog/drafts", "drafts-archive"), ("docs", "docs")]);
        let resolver = Resolver::new(root.path(), &index, ["md", "txt", "json"]);
        let result = resolver.resolve()?.to_string();
        let expect = indoc! {r#"
            .obsidian/workspace.json -> [docs]
            drafts.md -> [drafts-archive, site]
            nested/deep/both.txt -> [docs, site]
            post.md -> [site]
        "#};
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn resolve_is_idempotent() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        plant(
            root.path(),
            &[
                ("b.md", b"#x #y"),
                ("a.md", b"#y #x #x"),
                ("c/d.md", b"#X/child"),
            ],
        );

        let index = index(&[("x", "one"), ("y", "two"), ("y", "one")]);
        let resolver = Resolver::new(root.path(), &index, ["md"]);
        let first = resolver.resolve()?;
        let second = resolver.resolve()?;
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(first.destinations("a.md"), Some(&["one".to_string(), "two".to_string()][..]));
        assert_eq!(first.destinations("c/d.md"), Some(&["one".to_string()][..]));

        Ok(())
    }

    #[test]
    fn resolve_skips_excluded_directories() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        plant(
            root.path(),
            &[
                ("note.md", b"#blog"),
                ("workspace/site/note.md", b"#blog"),
            ],
        );

        let index = index(&[("blog", "site")]);
        let resolver = Resolver::new(root.path(), &index, ["md"])
            .exclude([root.path().join("workspace"), root.path().join("missing")]);
        let result = resolver.resolve()?;
        assert_eq!(result.len(), 1);
        assert_eq!(
            result.files_for("site"),
            BTreeSet::from([PathBuf::from("note.md")])
        );

        Ok(())
    }

    #[test]
    fn resolve_with_empty_index_routes_nothing() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        plant(root.path(), &[("note.md", b"#blog")]);

        let index = TagIndex::new();
        let result = Resolver::new(root.path(), &index, ["md"]).resolve()?;
        assert!(result.is_empty());

        Ok(())
    }

    #[test]
    fn resolve_missing_root() {
        let index = TagIndex::new();
        let result = Resolver::new("/definitely/not/here", &index, ["md"]).resolve();
        assert!(matches!(result, Err(ResolveError::MissingRoot(_))));
    }
}
