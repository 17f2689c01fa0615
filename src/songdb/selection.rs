use std::ops::Range;

use crate::filter::SongFilter;
use crate::song::LightSong;
use crate::tag::TagType;

/// A window covering every result.
pub const FULL_WINDOW: Range<usize> = 0..usize::MAX;

/// Key for sorting query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Tag(TagType),
    LastModified,
    Added,
}

impl SortOrder {
    /// Parse a sort key as given by clients: a tag name, `Last-Modified` or
    /// `Added`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("Last-Modified") {
            return Some(SortOrder::LastModified);
        }
        if name.eq_ignore_ascii_case("Added") {
            return Some(SortOrder::Added);
        }
        TagType::from_name(name).map(SortOrder::Tag)
    }
}

/// What a query covers: a base URI, recursion, an optional filter, and how
/// to order and slice the matches.
#[derive(Debug, Clone)]
pub struct DatabaseSelection<'a> {
    pub uri: String,
    pub recursive: bool,
    pub filter: Option<&'a SongFilter>,
    pub sort: Option<SortOrder>,
    pub descending: bool,
    /// Positions (after sorting) of the matches to report.
    pub window: Range<usize>,
}

impl<'a> DatabaseSelection<'a> {
    /// If `uri` is empty and the filter carries a `base` constraint, that
    /// base becomes the selection's URI.
    pub fn new(uri: impl Into<String>, recursive: bool, filter: Option<&'a SongFilter>) -> Self {
        let mut uri = uri.into();
        if uri.is_empty() {
            if let Some(base) = filter.and_then(SongFilter::get_base) {
                uri = base.to_string();
            }
        }
        Self {
            uri,
            recursive,
            filter,
            sort: None,
            descending: false,
            window: FULL_WINDOW,
        }
    }

    pub fn with_sort(mut self, sort: SortOrder, descending: bool) -> Self {
        self.sort = Some(sort);
        self.descending = descending;
        self
    }

    pub fn with_window(mut self, window: Range<usize>) -> Self {
        self.window = window;
        self
    }

    /// The whole catalog, unfiltered, in any order.
    pub fn is_empty(&self) -> bool {
        self.uri.is_empty() && self.recursive && !self.is_filtered() && !self.has_window()
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some_and(|f| !f.is_empty())
    }

    pub fn has_window(&self) -> bool {
        self.window != FULL_WINDOW
    }

    pub fn matches(&self, song: &LightSong) -> bool {
        self.filter.map_or(true, |f| f.matches(song))
    }
}
