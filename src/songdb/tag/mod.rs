//! # Tags
//!
//! A [`Tag`] is the immutable metadata snapshot of one song: an ordered list
//! of interned [`TagItem`]s plus an optional duration. The same type may occur
//! more than once (a song can have several genres or performers).
//!
//! Tags are never edited in place. Metadata is accumulated in a
//! [`TagBuilder`] and frozen with [`TagBuilder::commit`]. Cloning a `Tag` is
//! cheap: the item list is shared.
//!
//! ## Fallbacks
//!
//! Some types stand in for others when absent (see [`TagType::fallbacks`]).
//! [`Tag::get_sort_value`] applies them so that sorting by `AlbumArtistSort`
//! still orders a library that only has `Artist` tags.

mod builder;
mod pool;
mod types;

use std::sync::Arc;
use std::time::Duration;

pub use builder::TagBuilder;
pub use pool::{TagItem, TagPool};
pub use types::TagType;

#[derive(Debug, Clone)]
pub struct Tag {
    items: Arc<[TagItem]>,
    duration: Option<Duration>,
    has_playlist: bool,
}

impl Default for Tag {
    fn default() -> Self {
        Self {
            items: Arc::from(Vec::new()),
            duration: None,
            has_playlist: false,
        }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
            && self.duration == other.duration
            && self.has_playlist == other.has_playlist
    }
}

impl Tag {
    pub(crate) fn from_parts(
        items: Vec<TagItem>,
        duration: Option<Duration>,
        has_playlist: bool,
    ) -> Self {
        Self {
            items: items.into(),
            duration,
            has_playlist,
        }
    }

    /// No items, no duration, no embedded playlist.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.duration.is_none() && !self.has_playlist
    }

    pub fn items(&self) -> &[TagItem] {
        &self.items
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Whether the file carries an embedded playlist (e.g. a CUE sheet).
    pub fn has_playlist(&self) -> bool {
        self.has_playlist
    }

    pub fn has_type(&self, tag_type: TagType) -> bool {
        self.items.iter().any(|i| i.tag_type() == tag_type)
    }

    /// First value of the given type.
    pub fn get_value(&self, tag_type: TagType) -> Option<&str> {
        self.values(tag_type).next()
    }

    /// All values of the given type, in tag order.
    pub fn values(&self, tag_type: TagType) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(move |i| i.tag_type() == tag_type)
            .map(TagItem::value)
    }

    /// Value used to sort songs by `tag_type`.
    ///
    /// Falls back from `*Sort` types to their plain type and then along the
    /// fallback chain. Never fails: a song without any candidate sorts as `""`.
    pub fn get_sort_value(&self, tag_type: TagType) -> &str {
        if let Some(value) = self.get_value(tag_type) {
            return value;
        }
        let decayed = tag_type.decay_sort();
        if decayed != tag_type {
            if let Some(value) = self.get_value(decayed) {
                return value;
            }
        }
        tag_type
            .fallbacks()
            .iter()
            .find_map(|t| self.get_value(*t))
            .unwrap_or("")
    }

    /// Values of `tag_type`, or of the first present fallback type, or `[""]`.
    pub fn values_with_fallback(&self, tag_type: TagType) -> Vec<&str> {
        let values: Vec<&str> = self.values(tag_type).collect();
        if !values.is_empty() {
            return values;
        }
        for fallback in tag_type.fallbacks() {
            let values: Vec<&str> = self.values(*fallback).collect();
            if !values.is_empty() {
                return values;
            }
        }
        vec![""]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(items: &[(TagType, &str)]) -> Tag {
        let mut builder = TagBuilder::new();
        for (t, v) in items {
            builder.add_item(*t, v);
        }
        builder.commit()
    }

    #[test]
    fn test_multiple_values_of_same_type() {
        let tag = tag(&[
            (TagType::Genre, "Rock"),
            (TagType::Artist, "X"),
            (TagType::Genre, "Blues"),
        ]);
        assert_eq!(tag.values(TagType::Genre).collect::<Vec<_>>(), vec!["Rock", "Blues"]);
        assert_eq!(tag.get_value(TagType::Genre), Some("Rock"));
        assert!(tag.has_type(TagType::Artist));
        assert!(!tag.has_type(TagType::Album));
    }

    #[test]
    fn test_sort_value_prefers_exact_type() {
        let tag = tag(&[(TagType::ArtistSort, "Beatles, The"), (TagType::Artist, "The Beatles")]);
        assert_eq!(tag.get_sort_value(TagType::ArtistSort), "Beatles, The");
        assert_eq!(tag.get_sort_value(TagType::Artist), "The Beatles");
    }

    #[test]
    fn test_sort_value_falls_back_to_base_type() {
        let cases = [
            (TagType::AlbumArtistSort, TagType::AlbumArtist),
            (TagType::AlbumArtistSort, TagType::ArtistSort),
            (TagType::AlbumArtistSort, TagType::Artist),
            (TagType::AlbumArtist, TagType::Artist),
            (TagType::ArtistSort, TagType::Artist),
            (TagType::AlbumSort, TagType::Album),
            (TagType::TitleSort, TagType::Title),
            (TagType::ComposerSort, TagType::Composer),
        ];
        for (requested, present) in cases {
            let tag = tag(&[(present, "base value")]);
            assert_eq!(
                tag.get_sort_value(requested),
                "base value",
                "{requested} should fall back to {present}"
            );
        }
    }

    #[test]
    fn test_sort_value_chain_order() {
        let tag = tag(&[(TagType::Artist, "Artist"), (TagType::ArtistSort, "ArtistSort")]);
        // AlbumArtist is absent, so ArtistSort wins over Artist
        assert_eq!(tag.get_sort_value(TagType::AlbumArtistSort), "ArtistSort");
    }

    #[test]
    fn test_sort_value_never_null() {
        let tag = tag(&[(TagType::Title, "Only a title")]);
        assert_eq!(tag.get_sort_value(TagType::Artist), "");
        assert_eq!(Tag::default().get_sort_value(TagType::AlbumArtistSort), "");
    }

    #[test]
    fn test_values_with_fallback() {
        let tag = tag(&[(TagType::Artist, "A"), (TagType::Artist, "B")]);
        assert_eq!(tag.values_with_fallback(TagType::AlbumArtist), vec!["A", "B"]);
        assert_eq!(tag.values_with_fallback(TagType::Genre), vec![""]);
    }

    #[test]
    fn test_clone_shares_items() {
        let a = tag(&[(TagType::Title, "Shared")]);
        let b = a.clone();
        assert_eq!(a, b);
        assert!(std::ptr::eq(a.items().as_ptr(), b.items().as_ptr()));
    }
}
