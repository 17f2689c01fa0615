//! # Directory Tree
//!
//! The catalog is a tree of [`Directory`] nodes rooted at the empty path.
//! Nodes live in an arena ([`Tree`]) and refer to each other by
//! [`DirectoryId`]: a parent owns its children's ids, a child keeps its
//! parent's id as a plain back-reference.
//!
//! ```text
//!   ""  (root)
//!   ├── music
//!   │   ├── A            songs: song1.mp3, song2.mp3
//!   │   └── B
//!   └── remote           mounted: Arc<dyn Database>
//! ```
//!
//! ## Ids
//!
//! Ids are generational. Deleting a subtree bumps the generation of every
//! freed slot, so an id held across a lock release (see [`walk`]) can be
//! checked with [`Tree::get`] instead of silently pointing at a recycled node.
//!
//! ## Locking
//!
//! The tree is always accessed through the database's single mutex. None of
//! the operations here lock anything themselves; the caller passes the
//! guarded tree in.
//!
//! ## Mount points
//!
//! A directory with a mounted database is a leaf: it never has native
//! children or songs, lookups stop at it and hand the remaining path to the
//! caller, and [`Tree::prune_empty`] never removes it.

mod walk;

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::collate::{collate, compare_numeric};
use crate::database::Database;
use crate::song::{LightSong, Song};
use crate::tag::{TagBuilder, TagType};

pub use walk::{walk, WalkOptions};

/// The tree guarded by the database lock.
pub type TreeGuard<'a> = parking_lot::MutexGuard<'a, Tree>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectoryId {
    index: u32,
    generation: u32,
}

/// What kind of filesystem object a directory stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    #[default]
    Regular,
    /// A directory inside an archive file.
    Archive,
    /// A file containing several songs, e.g. a multi-track container.
    Container,
    /// A playlist file presented as a directory.
    Playlist,
}

impl DeviceKind {
    /// Name in the database file; `None` for regular directories.
    pub fn name(self) -> Option<&'static str> {
        match self {
            DeviceKind::Regular => None,
            DeviceKind::Archive => Some("archive"),
            DeviceKind::Container => Some("container"),
            DeviceKind::Playlist => Some("playlist"),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "archive" => Some(DeviceKind::Archive),
            "container" => Some(DeviceKind::Container),
            "playlist" => Some(DeviceKind::Playlist),
            _ => None,
        }
    }
}

/// A playlist file found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub name: String,
    pub mtime: Option<DateTime<Utc>>,
}

impl PlaylistInfo {
    pub fn new(name: impl Into<String>, mtime: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            mtime,
        }
    }
}

/// A detached view of a directory, as passed to visitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightDirectory {
    pub path: String,
    pub mtime: Option<DateTime<Utc>>,
}

impl LightDirectory {
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub(crate) fn prefixed(&self, base: &str) -> Self {
        let path = if self.path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, self.path)
        };
        Self {
            path,
            mtime: self.mtime,
        }
    }
}

pub struct Directory {
    path: String,
    parent: Option<DirectoryId>,
    children: Vec<DirectoryId>,
    pub songs: Vec<Song>,
    pub playlists: Vec<PlaylistInfo>,
    pub mtime: Option<DateTime<Utc>>,
    pub device: DeviceKind,
    mounted: Option<Arc<dyn Database>>,
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directory")
            .field("path", &self.path)
            .field("children", &self.children.len())
            .field("songs", &self.songs.len())
            .field("playlists", &self.playlists.len())
            .field("mount", &self.mounted.is_some())
            .finish()
    }
}

impl Directory {
    fn new(path: String, parent: Option<DirectoryId>) -> Self {
        Self {
            path,
            parent,
            children: Vec::new(),
            songs: Vec::new(),
            playlists: Vec::new(),
            mtime: None,
            device: DeviceKind::Regular,
            mounted: None,
        }
    }

    /// Path relative to the catalog root; empty for the root itself.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn parent(&self) -> Option<DirectoryId> {
        self.parent
    }

    pub fn children(&self) -> &[DirectoryId] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_mount(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn mounted(&self) -> Option<&Arc<dyn Database>> {
        self.mounted.as_ref()
    }

    /// No children, songs or playlists.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.songs.is_empty() && self.playlists.is_empty()
    }

    pub fn find_song(&self, name: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.filename == name)
    }

    pub fn export(&self) -> LightDirectory {
        LightDirectory {
            path: self.path.clone(),
            mtime: self.mtime,
        }
    }

    /// `None` for the root, as stored in [`LightSong::directory`].
    fn song_directory(&self) -> Option<&str> {
        (!self.path.is_empty()).then_some(self.path.as_str())
    }
}

struct Slot {
    generation: u32,
    dir: Option<Directory>,
}

/// Arena owning every [`Directory`] of one catalog.
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: DirectoryId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("directories", &self.len())
            .field("songs", &self.song_count(self.root))
            .finish()
    }
}

impl Index<DirectoryId> for Tree {
    type Output = Directory;

    fn index(&self, id: DirectoryId) -> &Directory {
        match self.get(id) {
            Some(dir) => dir,
            None => panic!("stale directory id {:?}", id),
        }
    }
}

impl IndexMut<DirectoryId> for Tree {
    fn index_mut(&mut self, id: DirectoryId) -> &mut Directory {
        match self.get_mut(id) {
            Some(dir) => dir,
            None => panic!("stale directory id {:?}", id),
        }
    }
}

impl Tree {
    /// A tree with nothing but an empty root.
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: DirectoryId {
                index: 0,
                generation: 0,
            },
        };
        tree.root = tree.alloc(Directory::new(String::new(), None));
        tree
    }

    pub fn root(&self) -> DirectoryId {
        self.root
    }

    pub fn get(&self, id: DirectoryId) -> Option<&Directory> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.dir.as_ref())
    }

    pub fn get_mut(&mut self, id: DirectoryId) -> Option<&mut Directory> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.dir.as_mut())
    }

    fn alloc(&mut self, dir: Directory) -> DirectoryId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.dir = Some(dir);
            DirectoryId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                dir: Some(dir),
            });
            DirectoryId {
                index,
                generation: 0,
            }
        }
    }

    /// Create a new child. The caller checks [`find_child`](Self::find_child)
    /// first; names are not checked for uniqueness here.
    pub fn create_child(&mut self, parent: DirectoryId, name: &str) -> DirectoryId {
        let parent_path = self[parent].path();
        let path = if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_path, name)
        };
        let id = self.alloc(Directory::new(path, Some(parent)));
        self[parent].children.push(id);
        id
    }

    pub fn find_child(&self, parent: DirectoryId, name: &str) -> Option<DirectoryId> {
        self[parent]
            .children
            .iter()
            .copied()
            .find(|c| self[*c].name() == name)
    }

    /// Find or create the named child.
    pub fn make_child(&mut self, parent: DirectoryId, name: &str) -> DirectoryId {
        match self.find_child(parent, name) {
            Some(id) => id,
            None => self.create_child(parent, name),
        }
    }

    pub fn add_song(&mut self, dir: DirectoryId, song: Song) {
        self[dir].songs.push(song);
    }

    pub fn find_song(&self, dir: DirectoryId, name: &str) -> Option<&Song> {
        self[dir].find_song(name)
    }

    pub fn remove_song(&mut self, dir: DirectoryId, name: &str) -> Option<Song> {
        let songs = &mut self[dir].songs;
        let pos = songs.iter().position(|s| s.filename == name)?;
        Some(songs.remove(pos))
    }

    /// Remove a directory and everything below it, closing mounted databases.
    ///
    /// Deleting the root empties it instead.
    pub fn delete(&mut self, id: DirectoryId) {
        let Some(parent) = self.get(id).map(Directory::parent) else {
            return;
        };
        match parent {
            Some(parent) => {
                self[parent].children.retain(|c| *c != id);
                self.free_subtree(id);
            }
            None => {
                let root = &mut self[id];
                let children = std::mem::take(&mut root.children);
                root.songs.clear();
                root.playlists.clear();
                root.mtime = None;
                for child in children {
                    self.free_subtree(child);
                }
            }
        }
    }

    fn free_subtree(&mut self, id: DirectoryId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        let Some(dir) = slot.dir.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        if let Some(db) = dir.mounted {
            debug!(path = %dir.path, "closing mounted database");
            db.close();
        }
        for child in dir.children {
            self.free_subtree(child);
        }
    }

    /// Resolve `uri` from the root. See [`lookup_from`](Self::lookup_from).
    pub fn lookup_directory<'u>(&self, uri: &'u str) -> (DirectoryId, Option<&'u str>) {
        let uri = uri.trim_start_matches('/');
        self.lookup_from(self.root, uri)
    }

    /// Descend from `start` along the components of `uri`.
    ///
    /// Returns the deepest directory reached and the part of `uri` that could
    /// not be resolved, or `None` if all of it was. Descent stops at mount
    /// points, leaving the rest for the mounted database.
    pub fn lookup_from<'u>(
        &self,
        start: DirectoryId,
        uri: &'u str,
    ) -> (DirectoryId, Option<&'u str>) {
        if uri.is_empty() {
            return (start, None);
        }
        let mut current = start;
        let mut rest = uri;
        loop {
            let (name, tail) = match rest.split_once('/') {
                Some((name, tail)) => (name, Some(tail)),
                None => (rest, None),
            };
            if name == "." || name == ".." {
                return (current, Some(rest));
            }
            let Some(child) = self.find_child(current, name) else {
                return (current, Some(rest));
            };
            current = child;
            match tail {
                None => return (current, None),
                Some(tail) if self[current].is_mount() => return (current, Some(tail)),
                Some(tail) => rest = tail,
            }
        }
    }

    /// Resolve a song target relative to `dir`; leading `../` steps up to
    /// the parent.
    pub fn lookup_target_song(&self, dir: DirectoryId, target: &str) -> Option<&Song> {
        if let Some(rest) = target.strip_prefix("../") {
            let parent = self[dir].parent?;
            return self.lookup_target_song(parent, rest);
        }
        match self.lookup_from(dir, target) {
            (found, Some(name)) if !name.contains('/') && !self[found].is_mount() => {
                self[found].find_song(name)
            }
            _ => None,
        }
    }

    /// Export a song for visitors, merging in the tag of its target song.
    pub fn export_song(&self, dir: DirectoryId, song: &Song) -> LightSong {
        let directory = &self[dir];
        let mut light = LightSong::new(song, directory.song_directory());
        if let Some(target) = song
            .target
            .as_deref()
            .and_then(|t| self.lookup_target_song(dir, t))
        {
            light.tag = TagBuilder::from(&song.tag)
                .complement(&target.tag)
                .commit();
        }
        light
    }

    /// Recursively sort children by path and songs by album, disc, track
    /// and file name.
    pub fn sort(&mut self, id: DirectoryId) {
        let mut children = std::mem::take(&mut self[id].children);
        children.sort_by(|a, b| collate(self[*a].path(), self[*b].path()));
        self[id].songs.sort_by(compare_songs);
        self[id].children = children.clone();
        for child in children {
            self.sort(child);
        }
    }

    /// Recursively delete empty directories below `id`. Mount points are
    /// kept even when empty. Returns the number of directories removed.
    pub fn prune_empty(&mut self, id: DirectoryId) -> usize {
        let mut removed = 0;
        for child in self[id].children.clone() {
            if self[child].is_mount() {
                continue;
            }
            removed += self.prune_empty(child);
            if self[child].is_empty() {
                debug!(path = %self[child].path(), "pruning empty directory");
                self.delete(child);
                removed += 1;
            }
        }
        removed
    }

    pub fn set_mount(&mut self, id: DirectoryId, db: Arc<dyn Database>) {
        self[id].mounted = Some(db);
    }

    pub fn take_mount(&mut self, id: DirectoryId) -> Option<Arc<dyn Database>> {
        self.get_mut(id).and_then(|dir| dir.mounted.take())
    }

    /// Songs stored natively below `id`, not counting mounted databases.
    pub fn song_count(&self, id: DirectoryId) -> usize {
        let dir = &self[id];
        dir.songs.len()
            + dir
                .children
                .iter()
                .map(|c| self.song_count(*c))
                .sum::<usize>()
    }

    /// Number of live directories, including the root.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self[self.root].is_empty()
    }
}

fn tag_value(song: &Song, tag_type: TagType) -> &str {
    song.tag.get_value(tag_type).unwrap_or("")
}

fn compare_songs(a: &Song, b: &Song) -> Ordering {
    collate(tag_value(a, TagType::Album), tag_value(b, TagType::Album))
        .then_with(|| compare_numeric(tag_value(a, TagType::Disc), tag_value(b, TagType::Disc)))
        .then_with(|| compare_numeric(tag_value(a, TagType::Track), tag_value(b, TagType::Track)))
        .then_with(|| collate(&a.filename, &b.filename))
}

#[cfg(any(test, feature = "test_utils"))]
pub mod fixtures {
    use super::*;
    use crate::tag::Tag;

    /// Build a tag from `(type, value)` pairs.
    pub fn tag(items: &[(TagType, &str)]) -> Tag {
        let mut builder = TagBuilder::new();
        for (t, v) in items {
            builder.add_item(*t, v);
        }
        builder.commit()
    }

    /// Add a song at `uri`, creating parent directories as needed.
    pub fn add_song_at(tree: &mut Tree, uri: &str, items: &[(TagType, &str)]) -> DirectoryId {
        let (dirs, name) = match uri.rsplit_once('/') {
            Some((dirs, name)) => (Some(dirs), name),
            None => (None, uri),
        };
        let mut dir = tree.root();
        for component in dirs.into_iter().flat_map(|d| d.split('/')) {
            dir = tree.make_child(dir, component);
        }
        tree.add_song(dir, Song::new(name).with_tag(tag(items)));
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_child_paths() {
        let mut tree = Tree::new();
        let music = tree.create_child(tree.root(), "music");
        let a = tree.create_child(music, "A");
        assert_eq!(tree[music].path(), "music");
        assert_eq!(tree[a].path(), "music/A");
        assert_eq!(tree[a].name(), "A");
        assert_eq!(tree[a].parent(), Some(music));
        assert_eq!(tree.find_child(music, "A"), Some(a));
        assert_eq!(tree.find_child(music, "B"), None);
        assert_eq!(tree.make_child(music, "A"), a);
    }

    #[test]
    fn test_lookup_directory() {
        let mut tree = Tree::new();
        add_song_at(&mut tree, "music/A/song1.mp3", &[]);
        let (a, rest) = tree.lookup_directory("music/A");
        assert_eq!(tree[a].path(), "music/A");
        assert_eq!(rest, None);

        let (a2, rest) = tree.lookup_directory("music/A/song1.mp3");
        assert_eq!(a2, a);
        assert_eq!(rest, Some("song1.mp3"));

        let (music, rest) = tree.lookup_directory("music/B/x");
        assert_eq!(tree[music].path(), "music");
        assert_eq!(rest, Some("B/x"));

        assert_eq!(tree.lookup_directory(""), (tree.root(), None));
        assert_eq!(tree.lookup_directory("/"), (tree.root(), None));
    }

    #[test]
    fn test_lookup_target_song_in_parent() {
        let mut tree = Tree::new();
        let album = add_song_at(
            &mut tree,
            "music/album.flac",
            &[(TagType::Album, "Live"), (TagType::Artist, "Band")],
        );
        let cue = tree.create_child(album, "album.cue");
        tree.add_song(
            cue,
            Song::new("track001")
                .with_target("../album.flac")
                .with_tag(tag(&[(TagType::Title, "Intro"), (TagType::Artist, "Guest")])),
        );

        let target = tree.lookup_target_song(cue, "../album.flac").unwrap();
        assert_eq!(target.filename, "album.flac");

        let song = tree.find_song(cue, "track001").unwrap().clone();
        let light = tree.export_song(cue, &song);
        assert_eq!(light.get_uri(), "music/album.cue/track001");
        assert_eq!(light.tag.get_value(TagType::Title), Some("Intro"));
        assert_eq!(light.tag.get_value(TagType::Artist), Some("Guest"));
        assert_eq!(light.tag.get_value(TagType::Album), Some("Live"));
    }

    #[test]
    fn test_sort_orders_songs_and_children() {
        let mut tree = Tree::new();
        let dir = add_song_at(&mut tree, "b/10.mp3", &[(TagType::Track, "10")]);
        add_song_at(&mut tree, "b/2.mp3", &[(TagType::Track, "2")]);
        add_song_at(&mut tree, "b/x.mp3", &[(TagType::Disc, "1"), (TagType::Track, "1")]);
        add_song_at(&mut tree, "Apple/a.mp3", &[]);
        add_song_at(&mut tree, "cherry/a.mp3", &[]);

        tree.sort(tree.root());
        let names: Vec<_> = tree[dir].songs.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["2.mp3", "10.mp3", "x.mp3"]);

        let root = tree.root();
        let children: Vec<_> = tree[root].children().iter().map(|c| tree[*c].path()).collect();
        assert_eq!(children, vec!["Apple", "b", "cherry"]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut tree = Tree::new();
        for uri in ["z/b.mp3", "z/a.mp3", "É/c.mp3", "e/d.mp3", "Z/e.mp3"] {
            add_song_at(&mut tree, uri, &[]);
        }
        let root = tree.root();
        tree.sort(root);
        let once: Vec<String> = tree[root]
            .children()
            .iter()
            .map(|c| tree[*c].path().to_string())
            .collect();
        tree.sort(root);
        let twice: Vec<String> = tree[root]
            .children()
            .iter()
            .map(|c| tree[*c].path().to_string())
            .collect();
        assert_eq!(once, twice);
        assert!(once.windows(2).all(|w| collate(&w[0], &w[1]) != Ordering::Greater));
    }

    #[test]
    fn test_delete_invalidates_ids() {
        let mut tree = Tree::new();
        let a = add_song_at(&mut tree, "music/A/x.mp3", &[]);
        let (music, _) = tree.lookup_directory("music");
        tree.delete(music);
        assert!(tree.get(a).is_none());
        assert!(tree.get(music).is_none());
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 1);

        // freed slots are reused with a new generation
        let fresh = tree.create_child(tree.root(), "new");
        assert_ne!(fresh, music);
        assert!(tree.get(music).is_none());
        assert_eq!(tree[fresh].path(), "new");
    }

    #[test]
    fn test_remove_song() {
        let mut tree = Tree::new();
        let dir = add_song_at(&mut tree, "a/x.mp3", &[]);
        assert!(tree.remove_song(dir, "y.mp3").is_none());
        assert_eq!(tree.remove_song(dir, "x.mp3").unwrap().filename, "x.mp3");
        assert!(tree[dir].songs.is_empty());
    }

    #[test]
    fn test_prune_empty() {
        let mut tree = Tree::new();
        add_song_at(&mut tree, "keep/x.mp3", &[]);
        let root = tree.root();
        let empty = tree.create_child(root, "empty");
        tree.create_child(empty, "nested");

        assert_eq!(tree.prune_empty(root), 2);
        assert!(tree.find_child(root, "empty").is_none());
        assert!(tree.find_child(root, "keep").is_some());
    }

    #[test]
    fn test_song_count() {
        let mut tree = Tree::new();
        add_song_at(&mut tree, "a/1.mp3", &[]);
        add_song_at(&mut tree, "a/b/2.mp3", &[]);
        add_song_at(&mut tree, "3.mp3", &[]);
        assert_eq!(tree.song_count(tree.root()), 3);
    }

    #[test]
    fn test_debug_summary() {
        let mut tree = Tree::new();
        add_song_at(&mut tree, "a/1.mp3", &[]);
        let debug = format!("{:?}", tree);
        assert!(debug.contains("directories: 2"), "{}", debug);
        assert!(debug.contains("songs: 1"), "{}", debug);
    }
}
