use std::borrow::Cow;
use std::mem;
use std::time::Duration;

use super::{Tag, TagItem, TagPool, TagType};

/// Mutable accumulator for a [`Tag`].
#[derive(Debug, Clone, Default)]
pub struct TagBuilder {
    items: Vec<TagItem>,
    duration: Option<Duration>,
    has_playlist: bool,
}

impl From<&Tag> for TagBuilder {
    fn from(tag: &Tag) -> Self {
        Self {
            items: tag.items().to_vec(),
            duration: tag.duration(),
            has_playlist: tag.has_playlist(),
        }
    }
}

impl TagBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.duration.is_none() && !self.has_playlist
    }

    pub fn set_duration(&mut self, duration: Option<Duration>) -> &mut Self {
        self.duration = duration;
        self
    }

    pub fn set_has_playlist(&mut self, has_playlist: bool) -> &mut Self {
        self.has_playlist = has_playlist;
        self
    }

    pub fn has_type(&self, tag_type: TagType) -> bool {
        self.items.iter().any(|i| i.tag_type() == tag_type)
    }

    /// Add a value, cleaning it first.
    ///
    /// Surrounding whitespace is trimmed and control characters become spaces.
    /// `Track` and `Disc` are reduced to their number (`"03/12"` → `"3"`).
    /// Values that end up empty are discarded.
    pub fn add_item(&mut self, tag_type: TagType, value: &str) -> &mut Self {
        let cleaned = clean_value(value);
        if cleaned.is_empty() {
            return self;
        }
        if tag_type.is_numeric() {
            let number = normalize_number(&cleaned);
            return self.push(tag_type, &number);
        }
        self.push(tag_type, &cleaned)
    }

    /// Add an item with an empty value; unlike [`add_item`](Self::add_item)
    /// this is kept.
    pub fn add_empty_item(&mut self, tag_type: TagType) -> &mut Self {
        self.push(tag_type, "")
    }

    pub fn remove_type(&mut self, tag_type: TagType) -> &mut Self {
        self.items.retain(|i| i.tag_type() != tag_type);
        self
    }

    /// Add the items of `other` whose type is absent from this builder.
    ///
    /// Existing values always win; used to fill in a CUE sub-song's tag from
    /// its container file.
    pub fn complement(&mut self, other: &Tag) -> &mut Self {
        let mut present = [false; TagType::COUNT];
        for item in &self.items {
            present[item.tag_type().index()] = true;
        }
        self.items.extend(
            other
                .items()
                .iter()
                .filter(|i| !present[i.tag_type().index()])
                .cloned(),
        );
        if self.duration.is_none() {
            self.duration = other.duration();
        }
        self.has_playlist |= other.has_playlist();
        self
    }

    /// Move the accumulated state into a new [`Tag`] and reset the builder.
    pub fn commit(&mut self) -> Tag {
        let items = mem::take(&mut self.items);
        let duration = self.duration.take();
        let has_playlist = mem::take(&mut self.has_playlist);
        Tag::from_parts(items, duration, has_playlist)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.duration = None;
        self.has_playlist = false;
    }

    fn push(&mut self, tag_type: TagType, value: &str) -> &mut Self {
        self.items.push(TagPool::global().get_item(tag_type, value));
        self
    }
}

fn clean_value(value: &str) -> Cow<'_, str> {
    let trimmed = value.trim();
    if trimmed.chars().any(char::is_control) {
        Cow::Owned(
            trimmed
                .chars()
                .map(|c| if c.is_control() { ' ' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(trimmed)
    }
}

/// Strip leading zeros and any non-numeric suffix. Values that do not start
/// with a digit are kept as they are.
fn normalize_number(value: &str) -> Cow<'_, str> {
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    if end == 0 {
        return Cow::Borrowed(value);
    }
    let digits = value[..end].trim_start_matches('0');
    if digits.is_empty() {
        Cow::Borrowed("0")
    } else {
        Cow::Borrowed(digits)
    }
}
