//! # Song Filters
//!
//! A [`SongFilter`] is a boolean predicate over songs, written in a small
//! parenthesized query language:
//!
//! ```text
//! ((Artist == "Abba") AND (!(Album contains "Gold")))
//! (any =~ "^live")
//! (base "music/A")
//! (modified-since "2024-01-01T00:00:00Z")
//! (AudioFormat =~ "*:24:*")
//! (prio >= 10)
//! ```
//!
//! Expressions parse into a tree of [`FilterExpr`] nodes. The top level of a
//! [`SongFilter`] is always an implicit AND, which is also what the legacy
//! flat form (`artist "Abba" album "Gold"`) produces.
//!
//! ## Operators
//!
//! | Operator | Matches |
//! |----------|---------|
//! | `==` / `!=` | whole value, case sensitive |
//! | `contains` / `!contains` | substring |
//! | `starts_with` / `!starts_with` | prefix |
//! | `eq_ci`, `contains_ci`, `starts_with_ci` | as above, ignoring case and accents |
//! | `=~` / `!~` | regular expression |
//!
//! `_cs` suffixes are accepted as explicit spellings of the case sensitive
//! forms.
//!
//! ## Tag matching
//!
//! A tag node matches if **any** value of the requested type matches. If the
//! song has no value of that type at all, the type's fallbacks are tried in
//! order (`AlbumArtist` falls back to `Artist`, never the reverse), and if
//! none is present either, an empty search value counts as a match. Negation
//! is applied to that final answer, so `(AlbumArtist != "X")` is false for a
//! song whose only artist tag is `Artist: X`.

mod parse;
mod string_filter;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{DbError, Result};
use crate::song::{AudioFormat, LightSong};
use crate::tag::{Tag, TagType};

pub use parse::parse_timestamp;
pub use string_filter::{MatchPosition, StringFilter};

/// Matches the song URI against a string.
#[derive(Debug, Clone)]
pub struct UriSongFilter {
    pub filter: StringFilter,
}

/// Matches songs at or below a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseSongFilter {
    pub value: String,
}

impl BaseSongFilter {
    pub fn matches_uri(&self, uri: &str) -> bool {
        self.value.is_empty()
            || uri
                .strip_prefix(self.value.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Matches a tag type, or every type when `tag_type` is `None` (`any`).
#[derive(Debug, Clone)]
pub struct TagSongFilter {
    pub tag_type: Option<TagType>,
    pub filter: StringFilter,
}

impl TagSongFilter {
    pub fn matches_tag(&self, tag: &Tag) -> bool {
        self.matches_without_negation(tag) != self.filter.is_negated()
    }

    fn matches_without_negation(&self, tag: &Tag) -> bool {
        let Some(tag_type) = self.tag_type else {
            return tag
                .items()
                .iter()
                .any(|i| self.filter.matches_without_negation(i.value()));
        };

        if tag.has_type(tag_type) {
            return tag
                .values(tag_type)
                .any(|v| self.filter.matches_without_negation(v));
        }

        for fallback in tag_type.fallbacks() {
            if tag.has_type(*fallback) {
                return tag
                    .values(*fallback)
                    .any(|v| self.filter.matches_without_negation(v));
            }
        }

        // An absent tag is treated as an empty string
        self.filter.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFormatSongFilter {
    pub format: AudioFormat,
    /// Match undefined fields of `format` as wildcards.
    pub mask: bool,
}

/// Conjunction of its items; true when empty.
#[derive(Debug, Clone, Default)]
pub struct AndSongFilter {
    pub items: Vec<FilterExpr>,
}

impl AndSongFilter {
    pub fn matches(&self, song: &LightSong) -> bool {
        self.items.iter().all(|i| i.matches(song))
    }

    pub fn to_expression(&self) -> String {
        match self.items.as_slice() {
            [] => String::new(),
            [only] => only.to_expression(),
            [first, rest @ ..] => {
                let mut e = format!("({}", first.to_expression());
                for item in rest {
                    e.push_str(" AND ");
                    e.push_str(&item.to_expression());
                }
                e.push(')');
                e
            }
        }
    }

    /// Optimize each item and splice nested ANDs into this one.
    fn optimize(self) -> Self {
        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items {
            match item.optimize() {
                FilterExpr::And(inner) => items.extend(inner.items),
                other => items.push(other),
            }
        }
        Self { items }
    }
}

/// One node of a filter expression.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    Uri(UriSongFilter),
    Base(BaseSongFilter),
    Tag(TagSongFilter),
    /// Songs modified at or after the given time.
    ModifiedSince(DateTime<Utc>),
    /// Songs added at or after the given time.
    AddedSince(DateTime<Utc>),
    AudioFormat(AudioFormatSongFilter),
    /// Songs with at least this priority.
    Priority(u8),
    And(AndSongFilter),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn matches(&self, song: &LightSong) -> bool {
        match self {
            FilterExpr::Uri(f) => f.filter.matches(&song.get_uri()),
            FilterExpr::Base(f) => f.matches_uri(&song.get_uri()),
            FilterExpr::Tag(f) => f.matches_tag(&song.tag),
            FilterExpr::ModifiedSince(since) => song.mtime.is_some_and(|t| t >= *since),
            FilterExpr::AddedSince(since) => song.added.is_some_and(|t| t >= *since),
            FilterExpr::AudioFormat(f) => song.audio_format.is_some_and(|af| {
                if f.mask {
                    af.matches_mask(&f.format)
                } else {
                    af == f.format
                }
            }),
            FilterExpr::Priority(min) => song.priority >= *min,
            FilterExpr::And(f) => f.matches(song),
            FilterExpr::Not(child) => !child.matches(song),
        }
    }

    /// Canonical expression text; parsing it yields an equivalent filter.
    pub fn to_expression(&self) -> String {
        match self {
            FilterExpr::Uri(f) => format!(
                "(file {} \"{}\")",
                f.filter.operator(),
                escape(f.filter.value())
            ),
            FilterExpr::Base(f) => format!("(base \"{}\")", escape(&f.value)),
            FilterExpr::Tag(f) => format!(
                "({} {} \"{}\")",
                f.tag_type.map_or("any", TagType::name),
                f.filter.operator(),
                escape(f.filter.value())
            ),
            FilterExpr::ModifiedSince(t) => {
                format!("(modified-since \"{}\")", format_timestamp(t))
            }
            FilterExpr::AddedSince(t) => format!("(added-since \"{}\")", format_timestamp(t)),
            FilterExpr::AudioFormat(f) => format!(
                "(AudioFormat {} \"{}\")",
                if f.mask { "=~" } else { "==" },
                f.format
            ),
            FilterExpr::Priority(p) => format!("(prio >= {})", p),
            FilterExpr::And(f) => f.to_expression(),
            FilterExpr::Not(child) => format!("(!{})", child.to_expression()),
        }
    }

    /// Flatten nested ANDs, unwrap singleton ANDs and fold negations of
    /// tag and URI nodes into the nodes themselves.
    pub fn optimize(self) -> FilterExpr {
        match self {
            FilterExpr::And(and) => {
                let mut and = and.optimize();
                if and.items.len() == 1 {
                    and.items.remove(0)
                } else {
                    FilterExpr::And(and)
                }
            }
            FilterExpr::Not(child) => match child.optimize() {
                FilterExpr::Tag(mut f) => {
                    f.filter.toggle_negated();
                    FilterExpr::Tag(f)
                }
                FilterExpr::Uri(mut f) => {
                    f.filter.toggle_negated();
                    FilterExpr::Uri(f)
                }
                FilterExpr::Not(inner) => *inner,
                other => FilterExpr::Not(Box::new(other)),
            },
            other => other,
        }
    }

    fn has_fold_case(&self) -> bool {
        match self {
            FilterExpr::Uri(f) => f.filter.fold_case(),
            FilterExpr::Tag(f) => f.filter.fold_case(),
            FilterExpr::And(f) => f.items.iter().any(FilterExpr::has_fold_case),
            FilterExpr::Not(child) => child.has_fold_case(),
            _ => false,
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\'' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A parsed song query: the implicit AND of its items.
#[derive(Debug, Clone, Default)]
pub struct SongFilter {
    and: AndSongFilter,
}

impl SongFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse client arguments.
    ///
    /// Arguments are either `(key, value)` pairs, matched in full (or as a
    /// case insensitive substring with `fold_case`), or single arguments
    /// starting with `(` holding an expression.
    pub fn parse(args: &[&str], fold_case: bool) -> Result<Self> {
        if args.is_empty() {
            return Err(DbError::Filter("Incorrect number of filter arguments".into()));
        }
        let mut filter = Self::new();
        let mut args = args;
        while let Some((first, rest)) = args.split_first() {
            if first.starts_with('(') {
                filter.add(parse::parse_expression(first, fold_case)?);
                args = rest;
                continue;
            }
            let Some((value, rest)) = rest.split_first() else {
                return Err(DbError::Filter("Incorrect number of filter arguments".into()));
            };
            filter.add(parse::parse_pair(first, value, fold_case)?);
            args = rest;
        }
        Ok(filter)
    }

    /// Parse one parenthesized expression.
    pub fn parse_expression(expression: &str) -> Result<Self> {
        let mut filter = Self::new();
        filter.add(parse::parse_expression(expression, false)?);
        Ok(filter)
    }

    /// Add a constraint. A top-level `AND` is spliced into this filter.
    pub fn add(&mut self, expr: FilterExpr) {
        match expr {
            FilterExpr::And(and) => self.and.items.extend(and.items),
            other => self.and.items.push(other),
        }
    }

    pub fn items(&self) -> &[FilterExpr] {
        &self.and.items
    }

    pub fn is_empty(&self) -> bool {
        self.and.items.is_empty()
    }

    pub fn optimize(&mut self) {
        self.and = std::mem::take(&mut self.and).optimize();
    }

    pub fn matches(&self, song: &LightSong) -> bool {
        self.and.matches(song)
    }

    pub fn to_expression(&self) -> String {
        self.and.to_expression()
    }

    /// Whether any string comparison ignores case.
    pub fn has_fold_case(&self) -> bool {
        self.and.items.iter().any(FilterExpr::has_fold_case)
    }

    /// The first `base` constraint, looking inside nested `AND`s.
    pub fn get_base(&self) -> Option<&str> {
        find_base(&self.and.items)
    }

    pub fn has_other_than_base(&self) -> bool {
        self.and
            .items
            .iter()
            .any(|i| !matches!(i, FilterExpr::Base(_)))
    }

    /// Copy of this filter as seen from inside the directory `prefix`.
    ///
    /// A `base` equal to `prefix` is dropped, one below it loses the prefix;
    /// everything else is kept as it is.
    pub fn without_base_prefix(&self, prefix: &str) -> SongFilter {
        SongFilter {
            and: AndSongFilter {
                items: strip_base_prefix(&self.and.items, prefix),
            },
        }
    }
}

fn find_base(items: &[FilterExpr]) -> Option<&str> {
    items.iter().find_map(|i| match i {
        FilterExpr::Base(b) => Some(b.value.as_str()),
        FilterExpr::And(and) => find_base(&and.items),
        _ => None,
    })
}

fn strip_base_prefix(items: &[FilterExpr], prefix: &str) -> Vec<FilterExpr> {
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        match item {
            FilterExpr::Base(base) => match base.value.strip_prefix(prefix) {
                Some("") => {}
                Some(rest) => match rest.strip_prefix('/') {
                    Some("") => {}
                    Some(rest) => result.push(FilterExpr::Base(BaseSongFilter {
                        value: rest.to_string(),
                    })),
                    None => result.push(item.clone()),
                },
                None => result.push(item.clone()),
            },
            FilterExpr::And(and) => result.push(FilterExpr::And(AndSongFilter {
                items: strip_base_prefix(&and.items, prefix),
            })),
            _ => result.push(item.clone()),
        }
    }
    result
}
