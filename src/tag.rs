// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hierarchical tag handling.
//!
//! Content files carry __tags__ as `#segment/segment/...` tokens anywhere in
//! their text. Each segment may only contain ASCII letters, digits,
//! underscores, and hyphens. Tags are case-insensitive, so every tag is kept
//! in lowercase once parsed.
//!
//! # Hierarchical Matching
//!
//! Tags form a hierarchy through their `/` separators. A file that carries
//! `#blog/drafts` also satisfies the shorter tag `blog`, because a descendant
//! always satisfies its ancestors. The reverse never holds: a file tagged with
//! `#blog` does not satisfy `blog/drafts`.
//!
//! # Numeric Tokens
//!
//! Tokens such as `#123` or `#2024/05` are issue numbers and dates far more
//! often than they are labels. A token made only of digits in every segment is
//! never treated as a tag.

use regex::Regex;
use std::{
    borrow::Borrow,
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
    sync::LazyLock,
};

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#([A-Za-z0-9_-]+(?:/[A-Za-z0-9_-]+)*)\b").expect("tag pattern is valid")
});

/// Normalized hierarchical tag.
///
/// # Invariant
///
/// - Always lowercase.
/// - One or more non-empty `/`-separated segments of `[a-z0-9_-]`.
/// - At least one character that is neither a digit nor a separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(String);

impl Tag {
    /// Parse a tag from raw text.
    ///
    /// Surrounding whitespace and a single leading `#` are ignored.
    ///
    /// # Errors
    ///
    /// - Return [`TagError::Empty`] if nothing remains after trimming.
    /// - Return [`TagError::InvalidSegment`] if a segment breaks the grammar.
    /// - Return [`TagError::Numeric`] if the tag is made only of digits.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        let body = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(TagError::Empty);
        }

        for segment in body.split('/') {
            let valid = !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(TagError::InvalidSegment {
                    tag: trimmed.to_string(),
                    segment: segment.to_string(),
                });
            }
        }

        if is_numeric(body) {
            return Err(TagError::Numeric(trimmed.to_string()));
        }

        Ok(Self(body.to_ascii_lowercase()))
    }

    /// Treat tag as string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check if this tag equals `other` or descends from it.
    pub fn satisfies(&self, other: &Tag) -> bool {
        match self.0.strip_prefix(other.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Iterate over this tag and every ancestor of it, longest first.
    ///
    /// For `a/b/c` this yields `a/b/c`, `a/b`, and `a`.
    pub fn lineage(&self) -> impl Iterator<Item = &str> {
        let tag = self.as_str();
        std::iter::once(tag).chain(
            tag.char_indices()
                .rev()
                .filter(|(_, c)| *c == '/')
                .map(move |(idx, _)| &tag[..idx]),
        )
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::parse(data)
    }
}

impl Display for Tag {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Scan text for every tag token it contains.
///
/// Duplicates collapse, order is irrelevant, and numeric tokens are dropped.
pub fn extract_tags(text: &str) -> BTreeSet<Tag> {
    TAG_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|token| token.as_str())
        .filter(|token| !is_numeric(token))
        .map(|token| Tag(token.to_ascii_lowercase()))
        .collect()
}

fn is_numeric(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit() || c == '/')
}

/// Known tags and the destinations each one routes to.
///
/// Built once from the taxonomy and never mutated afterwards during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagIndex {
    routes: BTreeMap<Tag, BTreeSet<String>>,
}

impl TagIndex {
    /// Construct new empty tag index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a known tag to a destination alias.
    pub fn insert(&mut self, tag: Tag, alias: impl Into<String>) {
        self.routes.entry(tag).or_default().insert(alias.into());
    }

    /// Destinations mapped directly to a known tag.
    pub fn destinations(&self, tag: &str) -> Option<&BTreeSet<String>> {
        self.routes.get(tag)
    }

    /// Iterate over known tags in sorted order.
    pub fn known_tags(&self) -> impl Iterator<Item = &Tag> {
        self.routes.keys()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Determine which known tags a piece of text satisfies.
    ///
    /// A known tag is satisfied when some token in the text equals it, or is
    /// a descendant of it. Each found token is checked against its own
    /// lineage, so the cost stays linear in the number of tokens rather than
    /// growing with every known tag.
    pub fn satisfied_by(&self, text: &str) -> BTreeSet<&Tag> {
        let mut satisfied = BTreeSet::new();
        for token in extract_tags(text) {
            for ancestor in token.lineage() {
                if let Some((known, _)) = self.routes.get_key_value(ancestor) {
                    satisfied.insert(known);
                }
            }
        }

        satisfied
    }

    /// Union of destinations for every known tag the text satisfies.
    pub fn route(&self, text: &str) -> BTreeSet<String> {
        self.satisfied_by(text)
            .into_iter()
            .filter_map(|tag| self.routes.get(tag))
            .flat_map(|aliases| aliases.iter().cloned())
            .collect()
    }
}

/// Tag parsing error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// Nothing left to parse.
    #[error("tag is empty")]
    Empty,

    /// Segment contains characters outside of the tag grammar.
    #[error("tag {tag:?} has invalid segment {segment:?}")]
    InvalidSegment { tag: String, segment: String },

    /// Every segment is made of digits.
    #[error("tag {0:?} is purely numeric")]
    Numeric(String),
}

/// Friendly result alias :3
pub type Result<T, E = TagError> = std::result::Result<T, E>;
