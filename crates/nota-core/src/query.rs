//! Parsed note-query AST.
//!
//! The textual query language is parsed outside this crate; what arrives
//! here is the structured form the query compiler consumes: WHERE/ORDER
//! templates containing `{tag<i>}` / `{attr<i>}` placeholders, plus one
//! description per referenced tag or attribute. Placeholder index `i`
//! corresponds positionally to `tags[i]` / `attrs[i]`, and each
//! placeholder appears at most once per template section.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How far from the note a tag relationship may sit to satisfy a
/// reference. Multiple depths on one reference are unioned with OR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    /// The note is the tag itself.
    Own,
    /// The note carries the tag directly.
    Child,
    /// The note is tagged by a note that itself carries the tag:
    /// exactly two relationship hops.
    Grandchild,
}

impl TryFrom<u8> for SearchDepth {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Own),
            1 => Ok(Self::Child),
            2 => Ok(Self::Grandchild),
            other => Err(Error::UnsupportedDepth(other)),
        }
    }
}

impl From<SearchDepth> for u8 {
    fn from(depth: SearchDepth) -> u8 {
        match depth {
            SearchDepth::Own => 0,
            SearchDepth::Child => 1,
            SearchDepth::Grandchild => 2,
        }
    }
}

/// A JSON-path predicate over relationship data.
///
/// `pattern` is a SQL fragment with `{exp<i>}` placeholders; `exps[i]` is
/// the dot-separated JSON path substituted for placeholder `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTagFilter {
    pub pattern: String,
    pub exps: Vec<String>,
}

impl ParsedTagFilter {
    pub fn new(pattern: impl Into<String>, exps: Vec<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exps,
        }
    }
}

/// One tag reference from the query text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTag {
    pub name: String,
    /// Space qualifier; unqualified references resolve against the query's
    /// default space, or globally when there is none.
    pub space: Option<String>,
    pub search_depths: BTreeSet<SearchDepth>,
    pub filter: Option<ParsedTagFilter>,
}

impl ParsedTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            space: None,
            search_depths: BTreeSet::new(),
            filter: None,
        }
    }

    pub fn in_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    pub fn at_depth(mut self, depth: SearchDepth) -> Self {
        self.search_depths.insert(depth);
        self
    }

    pub fn with_filter(mut self, filter: ParsedTagFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// One attribute reference from the query text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedAttr {
    pub name: String,
    pub space: Option<String>,
    /// Existence test (`true`) versus value test (`false`).
    pub exists: bool,
    /// Restrict matches to values attached through one of these tags.
    pub tag_name_filters: Vec<ParsedTag>,
}

impl ParsedAttr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            space: None,
            exists: false,
            tag_name_filters: Vec::new(),
        }
    }

    pub fn in_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }

    pub fn exists(mut self) -> Self {
        self.exists = true;
        self
    }

    pub fn through_tag(mut self, tag: ParsedTag) -> Self {
        self.tag_name_filters.push(tag);
        self
    }
}

/// A fully parsed note query, consumed once by the query compiler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// WHERE template; `None` or empty means no user filter.
    pub where_clause: Option<String>,
    /// ORDER BY template; `None` or empty means no ordering.
    pub order_clause: Option<String>,
    pub tags: Vec<ParsedTag>,
    pub attrs: Vec<ParsedAttr>,
}

impl ParsedQuery {
    pub fn new() -> Self {
        Self::default()
    }
}
