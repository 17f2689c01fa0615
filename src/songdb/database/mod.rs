//! # Databases
//!
//! [`Database`] is the contract every song catalog implements. The crate
//! ships one implementation, [`SimpleDatabase`], which keeps the whole tree
//! in memory and persists it to a single text file. Other implementations
//! (a proxy to a remote server, a media server client) plug into the same
//! trait and can be mounted into a [`SimpleDatabase`] at any directory.
//!
//! ## Lifecycle
//!
//! ```text
//!   new() ──► open() ──► get_song / visit / ... ──► close()
//! ```
//!
//! Every method takes `&self`; implementations do their own locking so that a
//! database can be shared as `Arc<dyn Database>` between the catalog that
//! mounts it and any thread querying it.

mod format;
pub(crate) mod mount;
mod simple;

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DbError, Result};
use crate::selection::DatabaseSelection;
use crate::song::LightSong;
use crate::tag::{Tag, TagType};
use crate::visitor::{DatabaseVisitor, VisitSongs};

pub use simple::SimpleDatabase;

/// Aggregate numbers over a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub song_count: usize,
    /// Distinct `Artist` values.
    pub artist_count: usize,
    /// Distinct `Album` values.
    pub album_count: usize,
    pub total_duration: Duration,
}

/// Distinct tag values, nested one level per requested tag type.
///
/// Collecting `[AlbumArtist, Album]` yields each album artist mapped to the
/// albums found under it; the innermost maps are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UniqueTags(pub BTreeMap<String, UniqueTags>);

impl UniqueTags {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, value: &str) -> Option<&UniqueTags> {
        self.0.get(value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    fn collect(&mut self, tag: &Tag, tag_types: &[TagType]) {
        let Some((first, rest)) = tag_types.split_first() else {
            return;
        };
        for value in tag.values_with_fallback(*first) {
            self.0
                .entry(value.to_string())
                .or_default()
                .collect(tag, rest);
        }
    }
}

pub trait Database: Send + Sync {
    /// Make the database ready for queries.
    fn open(&self) -> Result<()>;

    /// Release everything acquired by [`open`](Self::open). Songs obtained
    /// from [`get_song`](Self::get_song) must have been returned first.
    fn close(&self);

    /// Look up one song by URI. Pair every successful call with
    /// [`return_song`](Self::return_song).
    fn get_song(&self, uri: &str) -> Result<LightSong>;

    fn return_song(&self, song: LightSong);

    /// Report the directories, songs and playlists covered by `selection`.
    fn visit(&self, selection: &DatabaseSelection<'_>, visitor: &mut dyn DatabaseVisitor)
        -> Result<()>;

    fn collect_unique_tags(
        &self,
        selection: &DatabaseSelection<'_>,
        tag_types: &[TagType],
    ) -> Result<UniqueTags> {
        let mut result = UniqueTags::default();
        let mut visitor = VisitSongs::new(|song: &LightSong| {
            result.collect(&song.tag, tag_types);
            Ok(())
        });
        self.visit(selection, &mut visitor)?;
        Ok(result)
    }

    fn get_stats(&self, selection: &DatabaseSelection<'_>) -> Result<DatabaseStats> {
        let mut stats = DatabaseStats::default();
        let mut artists = HashSet::new();
        let mut albums = HashSet::new();
        let mut visitor = VisitSongs::new(|song: &LightSong| {
            stats.song_count += 1;
            if let Some(duration) = song.tag.duration() {
                stats.total_duration += duration;
            }
            artists.extend(song.tag.values(TagType::Artist).map(str::to_string));
            albums.extend(song.tag.values(TagType::Album).map(str::to_string));
            Ok(())
        });
        self.visit(selection, &mut visitor)?;
        stats.artist_count = artists.len();
        stats.album_count = albums.len();
        Ok(stats)
    }

    /// Start rescanning `uri`; returns a job id.
    fn update(&self, _uri: &str, _discard: bool) -> Result<u32> {
        Err(DbError::Disabled("Update not supported".into()))
    }

    /// When the database was last loaded or saved.
    fn update_stamp(&self) -> Option<DateTime<Utc>>;
}
