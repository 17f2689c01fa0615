//! # Tag Pool
//!
//! Large libraries repeat the same artist, album and genre strings thousands
//! of times. Every tag value is therefore interned in a process-wide pool:
//! asking for the same `(type, value)` pair twice yields the same shared
//! allocation.
//!
//! ## Reference Counting
//!
//! | Operation | Rust form |
//! |-----------|-----------|
//! | get item  | [`TagPool::get_item`] |
//! | dup item  | [`TagItem::clone`] |
//! | put item  | dropping the [`TagItem`] |
//!
//! The pool itself only holds weak references. When the last [`TagItem`] for
//! a value is dropped, its entry is removed from the pool.
//!
//! ## Sharding
//!
//! The pool is a [`DashMap`] per tag type, so unrelated lookups rarely contend
//! on the same lock.

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::TagType;

static POOL: Lazy<TagPool> = Lazy::new(TagPool::new);

struct ItemData {
    tag_type: TagType,
    value: Box<str>,
}

impl Drop for ItemData {
    fn drop(&mut self) {
        POOL.release(self.tag_type, &self.value);
    }
}

/// An interned `(type, value)` pair.
///
/// Two items with the same type and value always share one allocation, so
/// equality is pointer equality.
#[derive(Clone)]
pub struct TagItem(Arc<ItemData>);

impl TagItem {
    pub fn tag_type(&self) -> TagType {
        self.0.tag_type
    }

    pub fn value(&self) -> &str {
        &self.0.value
    }
}

impl PartialEq for TagItem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TagItem {}

impl fmt::Debug for TagItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.tag_type(), self.value())
    }
}

pub struct TagPool {
    shards: Vec<DashMap<Box<str>, Weak<ItemData>>>,
}

impl TagPool {
    fn new() -> Self {
        Self {
            shards: (0..TagType::COUNT).map(|_| DashMap::new()).collect(),
        }
    }

    /// The process-wide pool.
    pub fn global() -> &'static TagPool {
        &POOL
    }

    /// Return the interned item for `(tag_type, value)`, creating it if needed.
    pub fn get_item(&self, tag_type: TagType, value: &str) -> TagItem {
        let shard = &self.shards[tag_type.index()];

        let existing = shard.get(value).and_then(|weak| weak.upgrade());
        if let Some(item) = existing {
            return TagItem(item);
        }

        let mut entry = shard.entry(value.into()).or_insert_with(Weak::new);
        if let Some(item) = entry.upgrade() {
            return TagItem(item);
        }
        let item = Arc::new(ItemData {
            tag_type,
            value: value.into(),
        });
        *entry = Arc::downgrade(&item);
        TagItem(item)
    }

    /// Whether a live item exists for `(tag_type, value)`.
    pub fn contains(&self, tag_type: TagType, value: &str) -> bool {
        self.shards[tag_type.index()]
            .get(value)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Number of distinct live items in the pool.
    pub fn len(&self) -> usize {
        self.shards.iter().map(DashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, tag_type: TagType, value: &str) {
        // A concurrent get_item may already have replaced the dead entry
        self.shards[tag_type.index()].remove_if(value, |_, weak| weak.strong_count() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value_is_shared() {
        let pool = TagPool::global();
        let a = pool.get_item(TagType::Artist, "pool-test-shared");
        let b = pool.get_item(TagType::Artist, "pool-test-shared");
        assert_eq!(a, b);
        assert_eq!(a.value(), "pool-test-shared");
    }

    #[test]
    fn test_type_is_part_of_the_key() {
        let pool = TagPool::global();
        let a = pool.get_item(TagType::Artist, "pool-test-typed");
        let b = pool.get_item(TagType::Album, "pool-test-typed");
        assert_ne!(a, b);
        assert_eq!(b.tag_type(), TagType::Album);
    }

    #[test]
    fn test_last_drop_releases_entry() {
        let pool = TagPool::global();
        let a = pool.get_item(TagType::Genre, "pool-test-release");
        let dup = a.clone();
        drop(a);
        assert!(pool.contains(TagType::Genre, "pool-test-release"));
        drop(dup);
        assert!(!pool.contains(TagType::Genre, "pool-test-release"));
    }

    #[test]
    fn test_value_can_be_reinterned_after_release() {
        let pool = TagPool::global();
        drop(pool.get_item(TagType::Mood, "pool-test-again"));
        let again = pool.get_item(TagType::Mood, "pool-test-again");
        assert!(pool.contains(TagType::Mood, "pool-test-again"));
        assert_eq!(again.value(), "pool-test-again");
    }

    #[test]
    fn test_concurrent_interning_dedups() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    TagPool::global().get_item(TagType::Label, "pool-test-threads")
                })
            })
            .collect();
        let items: Vec<TagItem> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(items.windows(2).all(|w| w[0] == w[1]));
    }
}
