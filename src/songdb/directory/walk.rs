use parking_lot::MutexGuard;
use tracing::debug;

use super::{DirectoryId, Tree, TreeGuard};
use crate::database::mount::walk_mount;
use crate::error::Result;
use crate::filter::SongFilter;
use crate::visitor::DatabaseVisitor;

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions<'a> {
    pub recursive: bool,
    /// Applied to songs only; directories and playlists are always visited.
    pub filter: Option<&'a SongFilter>,
    /// Skip songs flagged as referenced by a playlist.
    pub hide_playlist_targets: bool,
}

/// Depth-first walk below `id`: songs, then playlists, then each child
/// directory (descending into it if `recursive`).
///
/// A mount point hands the whole walk to its mounted database. The tree lock
/// is released for the duration of that call and re-acquired afterwards;
/// children deleted in the meantime are skipped.
pub fn walk(
    tree: &mut TreeGuard<'_>,
    id: DirectoryId,
    options: &WalkOptions<'_>,
    visitor: &mut dyn DatabaseVisitor,
) -> Result<()> {
    let Some(dir) = tree.get(id) else {
        return Ok(());
    };

    if let Some(db) = dir.mounted().cloned() {
        let base = dir.path().to_string();
        debug!(path = %base, "delegating walk to mounted database");
        return MutexGuard::unlocked(tree, || {
            walk_mount(
                &base,
                db.as_ref(),
                "",
                options.recursive,
                options.filter,
                visitor,
            )
        });
    }

    visit_contents(tree, id, options, visitor)?;

    let children = tree[id].children().to_vec();
    for child in children {
        let Some(dir) = tree.get(child) else {
            continue;
        };
        visitor.visit_directory(&dir.export())?;
        if options.recursive {
            walk(tree, child, options, visitor)?;
        }
    }
    Ok(())
}

fn visit_contents(
    tree: &Tree,
    id: DirectoryId,
    options: &WalkOptions<'_>,
    visitor: &mut dyn DatabaseVisitor,
) -> Result<()> {
    let dir = &tree[id];
    for song in &dir.songs {
        if options.hide_playlist_targets && song.in_playlist {
            continue;
        }
        let light = tree.export_song(id, song);
        if options.filter.map_or(true, |f| f.matches(&light)) {
            visitor.visit_song(&light)?;
        }
    }

    if !dir.playlists.is_empty() {
        let parent = dir.export();
        for playlist in &dir.playlists {
            visitor.visit_playlist(playlist, &parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::fixtures::add_song_at;
    use crate::directory::{LightDirectory, PlaylistInfo};
    use crate::song::LightSong;
    use crate::tag::TagType;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl DatabaseVisitor for Recorder {
        fn visit_directory(&mut self, dir: &LightDirectory) -> Result<()> {
            self.events.push(format!("dir {}", dir.path));
            Ok(())
        }

        fn visit_song(&mut self, song: &LightSong) -> Result<()> {
            self.events.push(format!("song {}", song.get_uri()));
            Ok(())
        }

        fn visit_playlist(&mut self, playlist: &PlaylistInfo, dir: &LightDirectory) -> Result<()> {
            self.events.push(format!("playlist {}/{}", dir.path, playlist.name));
            Ok(())
        }
    }

    fn sample() -> Mutex<Tree> {
        let mut tree = Tree::new();
        let a = add_song_at(&mut tree, "music/A/1.mp3", &[(TagType::Artist, "X")]);
        add_song_at(&mut tree, "music/A/2.mp3", &[(TagType::Artist, "Y")]);
        add_song_at(&mut tree, "top.mp3", &[]);
        tree[a].playlists.push(PlaylistInfo::new("list.m3u", None));
        Mutex::new(tree)
    }

    #[test]
    fn test_recursive_walk_order() {
        let tree = sample();
        let mut guard = tree.lock();
        let root = guard.root();
        let mut rec = Recorder::default();
        let options = WalkOptions {
            recursive: true,
            ..Default::default()
        };
        walk(&mut guard, root, &options, &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec![
                "song top.mp3",
                "dir music",
                "dir music/A",
                "song music/A/1.mp3",
                "song music/A/2.mp3",
                "playlist music/A/list.m3u",
            ]
        );
    }

    #[test]
    fn test_non_recursive_walk_lists_children_only() {
        let tree = sample();
        let mut guard = tree.lock();
        let root = guard.root();
        let mut rec = Recorder::default();
        walk(&mut guard, root, &WalkOptions::default(), &mut rec).unwrap();
        assert_eq!(rec.events, vec!["song top.mp3", "dir music"]);
    }

    #[test]
    fn test_filter_applies_to_songs_only() {
        let tree = sample();
        let mut guard = tree.lock();
        let root = guard.root();
        let filter = SongFilter::parse(&["artist", "Y"], false).unwrap();
        let mut rec = Recorder::default();
        let options = WalkOptions {
            recursive: true,
            filter: Some(&filter),
            ..Default::default()
        };
        walk(&mut guard, root, &options, &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec![
                "dir music",
                "dir music/A",
                "song music/A/2.mp3",
                "playlist music/A/list.m3u",
            ]
        );
    }

    #[test]
    fn test_hide_playlist_targets() {
        let tree = sample();
        let mut guard = tree.lock();
        let (a, _) = guard.lookup_directory("music/A");
        guard[a].songs[0].in_playlist = true;
        let mut rec = Recorder::default();
        let options = WalkOptions {
            hide_playlist_targets: true,
            ..Default::default()
        };
        walk(&mut guard, a, &options, &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec!["song music/A/2.mp3", "playlist music/A/list.m3u"]
        );
    }
}
