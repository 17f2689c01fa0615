use tracing::debug;

use super::Database;
use crate::directory::{LightDirectory, PlaylistInfo};
use crate::error::Result;
use crate::filter::SongFilter;
use crate::selection::DatabaseSelection;
use crate::song::LightSong;
use crate::visitor::DatabaseVisitor;

/// Re-bases everything a mounted database reports under the mount path.
struct PrefixVisitor<'a> {
    base: &'a str,
    inner: &'a mut dyn DatabaseVisitor,
}

impl DatabaseVisitor for PrefixVisitor<'_> {
    fn visit_directory(&mut self, directory: &LightDirectory) -> Result<()> {
        self.inner.visit_directory(&directory.prefixed(self.base))
    }

    fn visit_song(&mut self, song: &LightSong) -> Result<()> {
        self.inner.visit_song(&song.prefixed(self.base))
    }

    fn visit_playlist(&mut self, playlist: &PlaylistInfo, directory: &LightDirectory) -> Result<()> {
        self.inner
            .visit_playlist(playlist, &directory.prefixed(self.base))
    }
}

/// Run a query against the database mounted at `base`.
///
/// `uri` is the part of the query path below the mount point. A `base`
/// constraint in `filter` is rewritten to be relative to the mount, and
/// results come back with `base` prepended. Sorting and windows are left to
/// the caller.
pub(crate) fn walk_mount(
    base: &str,
    db: &dyn Database,
    uri: &str,
    recursive: bool,
    filter: Option<&SongFilter>,
    visitor: &mut dyn DatabaseVisitor,
) -> Result<()> {
    let inner_filter = filter.map(|f| f.without_base_prefix(base));
    let selection = DatabaseSelection::new(uri, recursive, inner_filter.as_ref());
    debug!(base, uri = %selection.uri, "visiting mounted database");

    let mut prefix = PrefixVisitor {
        base,
        inner: visitor,
    };
    db.visit(&selection, &mut prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::fixtures::tag;
    use crate::song::Song;
    use crate::tag::TagType;
    use crate::visitor::VisitSongs;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    /// Records the selection it was asked for and reports one song.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    impl Database for Recording {
        fn open(&self) -> Result<()> {
            Ok(())
        }

        fn close(&self) {}

        fn get_song(&self, uri: &str) -> Result<LightSong> {
            Ok(LightSong::new(&Song::new(uri), None))
        }

        fn return_song(&self, _song: LightSong) {}

        fn visit(
            &self,
            selection: &DatabaseSelection<'_>,
            visitor: &mut dyn DatabaseVisitor,
        ) -> Result<()> {
            let base = selection
                .filter
                .and_then(|f| f.get_base())
                .map(str::to_string);
            self.seen.lock().push((selection.uri.clone(), base));
            let song = Song::new("x.mp3").with_tag(tag(&[(TagType::Artist, "X")]));
            visitor.visit_song(&LightSong::new(&song, Some("sub")))
        }

        fn update_stamp(&self) -> Option<DateTime<Utc>> {
            None
        }
    }

    #[test]
    fn test_base_is_rewritten_and_results_prefixed() {
        let db = Recording::default();
        let filter = SongFilter::parse_expression(r#"(base "remote/sub")"#).unwrap();
        let mut uris = Vec::new();
        let mut visitor = VisitSongs::new(|s: &LightSong| {
            uris.push(s.get_uri());
            Ok(())
        });
        walk_mount("remote", &db, "sub", true, Some(&filter), &mut visitor).unwrap();

        assert_eq!(
            db.seen.lock().as_slice(),
            &[("sub".to_string(), Some("sub".to_string()))]
        );
        assert_eq!(uris, vec!["remote/sub/x.mp3"]);
    }

    #[test]
    fn test_base_equal_to_mount_is_dropped() {
        let db = Recording::default();
        let filter = SongFilter::parse_expression(r#"(base "remote")"#).unwrap();
        let mut visitor = VisitSongs::new(|_: &LightSong| Ok(()));
        walk_mount("remote", &db, "", true, Some(&filter), &mut visitor).unwrap();
        assert_eq!(db.seen.lock().as_slice(), &[(String::new(), None)]);
    }
}
