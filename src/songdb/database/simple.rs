use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::format;
use super::mount::walk_mount;
use super::Database;
use crate::config::DatabaseConfig;
use crate::directory::{walk, Tree, TreeGuard, WalkOptions};
use crate::error::{DbError, Result};
use crate::selection::DatabaseSelection;
use crate::song::LightSong;
use crate::visitor::{DatabaseVisitor, DatabaseVisitorHelper};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// An in-memory catalog persisted to a single text file.
///
/// All state lives behind one mutex. Queries that reach a mounted database
/// release it for the duration of the nested call.
pub struct SimpleDatabase {
    path: PathBuf,
    compress: bool,
    hide_playlist_targets: bool,
    cache_directory: Option<PathBuf>,
    tree: Mutex<Tree>,
    is_open: AtomicBool,
    update_stamp: Mutex<Option<DateTime<Utc>>>,
    /// Songs handed out by `get_song` and not yet returned.
    borrowed: AtomicUsize,
}

impl SimpleDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_config(&DatabaseConfig::new(path))
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            path: config.path.clone(),
            compress: config.compress,
            hide_playlist_targets: config.hide_playlist_targets,
            cache_directory: config.cache_directory.clone(),
            tree: Mutex::new(Tree::new()),
            is_open: AtomicBool::new(false),
            update_stamp: Mutex::new(None),
            borrowed: AtomicUsize::new(0),
        }
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_hide_playlist_targets(mut self, hide: bool) -> Self {
        self.hide_playlist_targets = hide;
        self
    }

    pub fn with_cache_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_directory = Some(dir.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    /// Lock the tree for direct manipulation, e.g. by a scanner.
    pub fn lock_tree(&self) -> TreeGuard<'_> {
        self.tree.lock()
    }

    /// Like [`lock_tree`](Self::lock_tree), but `None` while someone else
    /// holds the lock.
    pub fn try_lock_tree(&self) -> Option<TreeGuard<'_>> {
        self.tree.try_lock()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DbError::Disabled("Database is not open".into()))
        }
    }

    /// Verify that the database file can be created or rewritten.
    pub fn check(&self) -> Result<()> {
        let path = self.path.display();
        if !self.path.exists() {
            let parent = match self.path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let meta = fs::metadata(parent)
                .map_err(|e| DbError::Io(e).context("On parent directory of db file"))?;
            if !meta.is_dir() {
                return Err(DbError::Io(io::Error::other(format!(
                    "Couldn't create db file \"{}\" because the parent path is not a directory",
                    path
                ))));
            }
            if meta.permissions().readonly() {
                return Err(DbError::Io(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("Can't create db file in \"{}\"", parent.display()),
                )));
            }
            return Ok(());
        }

        let meta = fs::metadata(&self.path).map_err(DbError::Io)?;
        if !meta.is_file() {
            return Err(DbError::Io(io::Error::other(format!(
                "db file \"{}\" is not a regular file",
                path
            ))));
        }
        if meta.permissions().readonly() {
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("Can't open db file \"{}\" for reading/writing", path),
            )));
        }
        Ok(())
    }

    fn load(&self) -> Result<()> {
        let file = File::open(&self.path).map_err(DbError::Io)?;
        let mut reader = BufReader::new(file);
        let gzipped = reader.fill_buf().map_err(DbError::Io)?.starts_with(&GZIP_MAGIC);
        let reader: Box<dyn BufRead> = if gzipped {
            Box::new(BufReader::new(GzDecoder::new(reader)))
        } else {
            Box::new(reader)
        };

        let mut tree = Tree::new();
        format::read_database(reader, &mut tree)?;
        let songs = tree.song_count(tree.root());
        *self.tree.lock() = tree;
        *self.update_stamp.lock() = file_mtime(&self.path);
        info!(path = %self.path.display(), songs, gzipped, "database loaded");
        Ok(())
    }

    /// Prune, sort and write the tree to the database file.
    ///
    /// The file is replaced atomically: a temporary file in the same
    /// directory is written, synced and renamed over the old one.
    pub fn save(&self) -> Result<()> {
        self.ensure_open()?;
        let mut data = Vec::new();
        let (songs, pruned) = {
            let mut tree = self.tree.lock();
            let root = tree.root();
            let pruned = tree.prune_empty(root);
            tree.sort(root);
            format::write_database(&tree, &mut data).map_err(DbError::Io)?;
            (tree.song_count(root), pruned)
        };

        if self.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data).map_err(DbError::Io)?;
            data = encoder.finish().map_err(DbError::Io)?;
        }

        write_atomic(&self.path, &data)
            .map_err(|e| DbError::Io(e).context(format!("Failed to write {}", self.path.display())))?;
        *self.update_stamp.lock() = file_mtime(&self.path).or_else(|| Some(Utc::now()));
        info!(path = %self.path.display(), songs, pruned, compressed = self.compress, "database saved");
        Ok(())
    }

    /// Mount `db` at `uri`. The last component of `uri` must not exist
    /// yet; its parent must.
    pub fn mount(&self, uri: &str, db: Arc<dyn Database>) -> Result<()> {
        let mut tree = self.tree.lock();
        let (parent, rest) = tree.lookup_directory(uri);
        let Some(name) = rest else {
            return Err(DbError::Conflict("Already exists".into()));
        };
        if tree[parent].is_mount() {
            return Err(DbError::Conflict(format!(
                "Cannot mount inside mount point {}",
                tree[parent].path()
            )));
        }
        if name.is_empty() || name.contains('/') {
            return Err(DbError::NotFound("Parent not found".into()));
        }
        let id = tree.create_child(parent, name);
        tree.set_mount(id, db);
        info!(uri, "database mounted");
        Ok(())
    }

    /// Mount a cache-backed [`SimpleDatabase`] for `storage_uri` at
    /// `local_uri`. Its file lives in the cache directory under a name
    /// derived from `storage_uri`.
    pub fn mount_storage(&self, local_uri: &str, storage_uri: &str) -> Result<()> {
        let Some(cache_directory) = &self.cache_directory else {
            return Err(DbError::Disabled("No 'cache_directory' configured".into()));
        };
        if storage_uri.is_empty() {
            return Err(DbError::NotFound("Empty storage URI".into()));
        }

        let db = Arc::new(
            SimpleDatabase::new(cache_directory.join(cache_file_name(storage_uri)))
                .with_compress(self.compress)
                .with_hide_playlist_targets(self.hide_playlist_targets),
        );
        db.open()?;
        if let Err(e) = self.mount(local_uri, db.clone()) {
            db.close();
            return Err(e);
        }
        debug!(local_uri, storage_uri, path = %db.path().display(), "storage mounted");
        Ok(())
    }

    /// Detach the database mounted at exactly `uri` and hand it back. The
    /// caller closes it.
    pub fn unmount(&self, uri: &str) -> Result<Arc<dyn Database>> {
        let mut tree = self.tree.lock();
        let (id, rest) = tree.lookup_directory(uri);
        if rest.is_some() || !tree[id].is_mount() {
            return Err(DbError::NotFound("Not a mount point".into()));
        }
        let db = tree
            .take_mount(id)
            .ok_or_else(|| DbError::NotFound("Not a mount point".into()))?;
        tree.delete(id);
        info!(uri, "database unmounted");
        Ok(db)
    }

    fn visit_native(
        &self,
        selection: &DatabaseSelection<'_>,
        visitor: &mut dyn DatabaseVisitor,
    ) -> Result<()> {
        let mut tree = self.tree.lock();
        let (id, rest) = tree.lookup_directory(&selection.uri);

        if let Some(db) = tree[id].mounted().cloned() {
            let base = tree[id].path().to_string();
            drop(tree);
            return walk_mount(
                &base,
                db.as_ref(),
                rest.unwrap_or(""),
                selection.recursive,
                selection.filter,
                visitor,
            );
        }

        match rest {
            None => {
                if selection.recursive && !tree[id].is_root() {
                    visitor.visit_directory(&tree[id].export())?;
                }
                let options = WalkOptions {
                    recursive: selection.recursive,
                    filter: selection.filter,
                    hide_playlist_targets: self.hide_playlist_targets,
                };
                walk(&mut tree, id, &options, visitor)
            }
            Some(name) if !name.contains('/') => {
                let Some(song) = tree.find_song(id, name) else {
                    return Err(DbError::NotFound("No such directory".into()));
                };
                let song = tree.export_song(id, song);
                if selection.matches(&song) {
                    visitor.visit_song(&song)?;
                }
                Ok(())
            }
            Some(_) => Err(DbError::NotFound("No such directory".into())),
        }
    }
}

impl Database for SimpleDatabase {
    /// Load the database file. A missing or unreadable file leaves an empty
    /// catalog, as long as the file could be written on the next save.
    fn open(&self) -> Result<()> {
        {
            let mut tree = self.tree.lock();
            let root = tree.root();
            tree.delete(root);
            *tree = Tree::new();
        }
        *self.update_stamp.lock() = None;

        if !self.path.exists() {
            debug!(path = %self.path.display(), "no database file, starting empty");
            self.check()
                .map_err(|e| e.context(format!("Cannot open database {}", self.path.display())))?;
        } else if let Err(e) = self.load() {
            error!(path = %self.path.display(), error = %e, "failed to load database, discarding");
            self.check()
                .map_err(|e| e.context(format!("Cannot open database {}", self.path.display())))?;
            *self.tree.lock() = Tree::new();
        }

        self.is_open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        debug_assert_eq!(
            self.borrowed.load(Ordering::SeqCst),
            0,
            "songs still borrowed at close"
        );
        let mut tree = self.tree.lock();
        let root = tree.root();
        tree.delete(root);
        self.is_open.store(false, Ordering::SeqCst);
    }

    fn get_song(&self, uri: &str) -> Result<LightSong> {
        self.ensure_open()?;
        let tree = self.tree.lock();
        let (id, rest) = tree.lookup_directory(uri);

        if let Some(db) = tree[id].mounted().cloned() {
            let base = tree[id].path().to_string();
            drop(tree);
            let song = db.get_song(rest.unwrap_or(""))?;
            let light = song.prefixed(&base);
            db.return_song(song);
            self.borrowed.fetch_add(1, Ordering::SeqCst);
            return Ok(light);
        }

        let name = match rest {
            Some(name) if !name.contains('/') => name,
            _ => return Err(DbError::NotFound("No such song".into())),
        };
        let song = tree
            .find_song(id, name)
            .ok_or_else(|| DbError::NotFound("No such song".into()))?;
        let light = tree.export_song(id, song);
        self.borrowed.fetch_add(1, Ordering::SeqCst);
        Ok(light)
    }

    fn return_song(&self, _song: LightSong) {
        let returned = self
            .borrowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        debug_assert!(returned.is_ok(), "song returned that was never borrowed");
    }

    fn visit(
        &self,
        selection: &DatabaseSelection<'_>,
        visitor: &mut dyn DatabaseVisitor,
    ) -> Result<()> {
        self.ensure_open()?;
        let mut helper = DatabaseVisitorHelper::new(selection, visitor);
        self.visit_native(selection, &mut helper)?;
        helper.commit()
    }

    fn update_stamp(&self) -> Option<DateTime<Utc>> {
        *self.update_stamp.lock()
    }
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));

    let result = File::create(&tmp).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    let result = result.and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// File name for a cache-backed mount: every byte outside `[A-Za-z0-9._-]`
/// and a leading `.` are percent-escaped, so distinct URIs never collide.
fn cache_file_name(storage_uri: &str) -> String {
    let mut name = String::with_capacity(storage_uri.len());
    for (i, b) in storage_uri.bytes().enumerate() {
        let safe = b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-') || (b == b'.' && i > 0);
        if safe {
            name.push(b as char);
        } else {
            name.push_str(&format!("%{:02X}", b));
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::fixtures::add_song_at;
    use crate::error::ErrorCode;
    use crate::tag::TagType;
    use tempfile::TempDir;

    fn open_db(temp: &TempDir) -> SimpleDatabase {
        let db = SimpleDatabase::new(temp.path().join("db"));
        db.open().unwrap();
        db
    }

    #[test]
    fn test_cache_file_name() {
        assert_eq!(cache_file_name("nfs://host/music"), "nfs%3A%2F%2Fhost%2Fmusic");
        assert_eq!(cache_file_name("a_b-c.d"), "a_b-c.d");
        assert_eq!(cache_file_name(".."), "%2E.");
        assert_ne!(cache_file_name("a/b"), cache_file_name("a%2Fb"));
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);
        assert!(db.is_open());
        assert!(db.lock_tree().is_empty());
        assert_eq!(db.update_stamp(), None);
    }

    #[test]
    fn test_closed_database_is_disabled() {
        let temp = TempDir::new().unwrap();
        let db = SimpleDatabase::new(temp.path().join("db"));
        let err = db.get_song("a.mp3").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Disabled));
    }

    #[test]
    fn test_get_song_errors() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);
        add_song_at(&mut db.lock_tree(), "music/a.mp3", &[(TagType::Title, "A")]);

        let song = db.get_song("music/a.mp3").unwrap();
        assert_eq!(song.get_uri(), "music/a.mp3");
        db.return_song(song);

        for uri in ["music/b.mp3", "music", "music/x/a.mp3", "nothing/a.mp3"] {
            let err = db.get_song(uri).unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::NotFound), "{}", uri);
        }
        db.close();
    }

    #[test]
    fn test_save_is_atomic_and_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);
        add_song_at(&mut db.lock_tree(), "a.mp3", &[]);
        db.save().unwrap();
        db.save().unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["db"]);
        assert!(db.update_stamp().is_some());
    }

    #[test]
    fn test_save_requires_open() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);
        add_song_at(&mut db.lock_tree(), "a.mp3", &[]);
        db.save().unwrap();
        db.close();

        let err = db.save().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Disabled));
        let never_opened = SimpleDatabase::new(temp.path().join("db"));
        assert!(never_opened.save().is_err());

        let reopened = open_db(&temp);
        let tree = reopened.lock_tree();
        assert_eq!(tree.song_count(tree.root()), 1);
    }

    #[test]
    fn test_compressed_file_starts_with_gzip_magic() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);
        db.save().unwrap();
        assert!(fs::read(db.path()).unwrap().starts_with(&GZIP_MAGIC));

        let plain = open_db(&temp).with_compress(false);
        plain.save().unwrap();
        assert!(fs::read(plain.path()).unwrap().starts_with(b"info_begin\n"));
    }

    #[test]
    fn test_check_rejects_directory_path() {
        let temp = TempDir::new().unwrap();
        let db = SimpleDatabase::new(temp.path());
        assert!(db.check().unwrap_err().to_string().contains("not a regular file"));
    }

    #[test]
    fn test_mount_storage_requires_cache_directory() {
        let temp = TempDir::new().unwrap();
        let db = open_db(&temp);
        let err = db.mount_storage("remote", "nfs://host/music").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Disabled));
    }

    #[test]
    fn test_mount_storage_creates_nested_database() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        fs::create_dir(&cache).unwrap();
        let db = SimpleDatabase::new(temp.path().join("db")).with_cache_directory(&cache);
        db.open().unwrap();

        db.mount_storage("remote", "nfs://host/music").unwrap();
        {
            let tree = db.lock_tree();
            let (id, rest) = tree.lookup_directory("remote");
            assert!(rest.is_none());
            assert!(tree[id].is_mount());
        }

        let nested = db.unmount("remote").unwrap();
        nested.close();
        assert!(db.lock_tree().is_empty());
    }
}
