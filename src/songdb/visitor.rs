//! # Visitors
//!
//! Queries report their results through a [`DatabaseVisitor`]. Every method
//! has a no-op default, so a caller interested only in songs implements just
//! [`DatabaseVisitor::visit_song`], or wraps a closure in [`VisitSongs`].
//!
//! ## Sorting and windows
//!
//! A database walk produces songs in tree order. [`DatabaseVisitorHelper`]
//! sits between the walk and the caller's visitor and adds what the walk
//! cannot do natively:
//!
//! | Selection            | Behavior |
//! |----------------------|----------|
//! | no sort, no window   | songs are forwarded as they arrive |
//! | window only          | songs are counted; only those inside the window are forwarded |
//! | sort (± window)      | songs are buffered, sorted and sliced in [`DatabaseVisitorHelper::commit`] |
//!
//! Directories and playlists are always forwarded immediately.

use std::cmp::Ordering;
use std::ops::Range;

use crate::collate::{collate, compare_numeric};
use crate::directory::{LightDirectory, PlaylistInfo};
use crate::error::Result;
use crate::selection::{DatabaseSelection, SortOrder, FULL_WINDOW};
use crate::song::LightSong;

pub trait DatabaseVisitor {
    fn visit_directory(&mut self, _directory: &LightDirectory) -> Result<()> {
        Ok(())
    }

    fn visit_song(&mut self, _song: &LightSong) -> Result<()> {
        Ok(())
    }

    fn visit_playlist(&mut self, _playlist: &PlaylistInfo, _directory: &LightDirectory) -> Result<()> {
        Ok(())
    }
}

/// Adapts a closure to a visitor that only cares about songs.
pub struct VisitSongs<F>(F);

impl<F> VisitSongs<F>
where
    F: FnMut(&LightSong) -> Result<()>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> DatabaseVisitor for VisitSongs<F>
where
    F: FnMut(&LightSong) -> Result<()>,
{
    fn visit_song(&mut self, song: &LightSong) -> Result<()> {
        (self.0)(song)
    }
}

/// Adds sorting and windowing on top of a plain walk.
///
/// The database must call [`commit`](Self::commit) once its walk is done;
/// buffered songs are only forwarded then.
pub struct DatabaseVisitorHelper<'v> {
    sort: Option<SortOrder>,
    descending: bool,
    window: Range<usize>,
    counter: usize,
    buffer: Vec<LightSong>,
    inner: &'v mut dyn DatabaseVisitor,
}

impl<'v> DatabaseVisitorHelper<'v> {
    pub fn new(selection: &DatabaseSelection<'_>, inner: &'v mut dyn DatabaseVisitor) -> Self {
        Self {
            sort: selection.sort,
            descending: selection.descending,
            window: selection.window.clone(),
            counter: 0,
            buffer: Vec::new(),
            inner,
        }
    }

    /// Sort and forward buffered songs.
    pub fn commit(mut self) -> Result<()> {
        let Some(order) = self.sort else {
            return Ok(());
        };
        let mut songs = std::mem::take(&mut self.buffer);
        let descending = self.descending;
        songs.sort_by(|a, b| {
            let ordering = compare_songs(order, a, b);
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let end = self.window.end.min(songs.len());
        let start = self.window.start.min(end);
        for song in &songs[start..end] {
            self.inner.visit_song(song)?;
        }
        Ok(())
    }
}

impl DatabaseVisitor for DatabaseVisitorHelper<'_> {
    fn visit_directory(&mut self, directory: &LightDirectory) -> Result<()> {
        self.inner.visit_directory(directory)
    }

    fn visit_song(&mut self, song: &LightSong) -> Result<()> {
        if self.sort.is_some() {
            self.buffer.push(song.clone());
            return Ok(());
        }
        if self.window == FULL_WINDOW {
            return self.inner.visit_song(song);
        }
        let position = self.counter;
        self.counter += 1;
        if self.window.contains(&position) {
            self.inner.visit_song(song)?;
        }
        Ok(())
    }

    fn visit_playlist(&mut self, playlist: &PlaylistInfo, directory: &LightDirectory) -> Result<()> {
        self.inner.visit_playlist(playlist, directory)
    }
}

fn compare_songs(order: SortOrder, a: &LightSong, b: &LightSong) -> Ordering {
    match order {
        SortOrder::LastModified => a.mtime.cmp(&b.mtime),
        SortOrder::Added => a.added.cmp(&b.added),
        SortOrder::Tag(tag_type) => {
            let (x, y) = (a.tag.get_sort_value(tag_type), b.tag.get_sort_value(tag_type));
            if tag_type.is_numeric() {
                compare_numeric(x, y)
            } else {
                collate(x, y)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::fixtures::tag;
    use crate::song::Song;
    use crate::tag::TagType;
    use chrono::{TimeZone, Utc};

    fn song(name: &str, track: &str) -> LightSong {
        let song = Song::new(name).with_tag(tag(&[(TagType::Track, track)]));
        LightSong::new(&song, None)
    }

    fn run(selection: &DatabaseSelection<'_>, songs: &[LightSong]) -> Vec<String> {
        let mut seen = Vec::new();
        let mut collect = VisitSongs::new(|s: &LightSong| {
            seen.push(s.uri.clone());
            Ok(())
        });
        let mut helper = DatabaseVisitorHelper::new(selection, &mut collect);
        for s in songs {
            helper.visit_song(s).unwrap();
        }
        helper.commit().unwrap();
        seen
    }

    fn ten_songs() -> Vec<LightSong> {
        (0..10)
            .rev()
            .map(|i| song(&format!("s{}", i), &i.to_string()))
            .collect()
    }

    #[test]
    fn test_passthrough() {
        let songs = ten_songs();
        let selection = DatabaseSelection::new("", true, None);
        assert_eq!(run(&selection, &songs).len(), 10);
    }

    #[test]
    fn test_window_without_sort_streams() {
        let songs = ten_songs();
        let selection = DatabaseSelection::new("", true, None).with_window(2..5);
        assert_eq!(run(&selection, &songs), vec!["s7", "s6", "s5"]);
    }

    #[test]
    fn test_window_after_sort() {
        let songs = ten_songs();
        let selection = DatabaseSelection::new("", true, None)
            .with_sort(SortOrder::Tag(TagType::Track), false)
            .with_window(2..5);
        assert_eq!(run(&selection, &songs), vec!["s2", "s3", "s4"]);
    }

    #[test]
    fn test_descending_sort() {
        let songs = vec![song("a", "2"), song("b", "10"), song("c", "1")];
        let selection =
            DatabaseSelection::new("", true, None).with_sort(SortOrder::Tag(TagType::Track), true);
        assert_eq!(run(&selection, &songs), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_window_past_end() {
        let songs = vec![song("a", "1"), song("b", "2")];
        let selection = DatabaseSelection::new("", true, None)
            .with_sort(SortOrder::Tag(TagType::Track), false)
            .with_window(1..50);
        assert_eq!(run(&selection, &songs), vec!["b"]);
    }

    #[test]
    fn test_sort_by_last_modified_is_stable() {
        let t = |secs| Utc.timestamp_opt(secs, 0).single();
        let mut a = song("a", "1");
        a.mtime = t(200);
        let mut b = song("b", "1");
        b.mtime = t(100);
        let mut c = song("c", "1");
        c.mtime = t(200);
        let selection =
            DatabaseSelection::new("", true, None).with_sort(SortOrder::LastModified, false);
        assert_eq!(run(&selection, &[a, b, c]), vec!["b", "a", "c"]);
    }
}
