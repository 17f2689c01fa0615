//! The database file.
//!
//! A line oriented text format. A header lists the format version and the
//! tag types the file was written with, then the tree follows depth first:
//!
//! ```text
//! info_begin
//! format: 2
//! songdb_version: 0.3.2
//! fs_charset: UTF-8
//! tag: Artist
//! ...
//! info_end
//! directory: music
//! mtime: 1700000000
//! begin: music
//! song_begin: song1.mp3
//! Time: 215.000
//! Artist: X
//! Track: 2
//! mtime: 1700000000
//! song_end
//! playlist_begin: best.m3u
//! mtime: 1700000000
//! playlist_end
//! end: music
//! ```
//!
//! Reading is strict: unknown lines, duplicate names and truncated files are
//! errors, reported with their line number.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::directory::{DeviceKind, DirectoryId, PlaylistInfo, Tree};
use crate::error::{DbError, Result};
use crate::song::{AudioFormat, Song};
use crate::tag::{Tag, TagBuilder, TagType};

const DB_FORMAT: u32 = 2;

const INFO_BEGIN: &str = "info_begin";
const INFO_END: &str = "info_end";
const FORMAT_PREFIX: &str = "format: ";
const VERSION_PREFIX: &str = "songdb_version: ";
const CHARSET_PREFIX: &str = "fs_charset: ";
const TAG_PREFIX: &str = "tag: ";

const DIRECTORY_DIR: &str = "directory: ";
const DIRECTORY_TYPE: &str = "type: ";
const DIRECTORY_MTIME: &str = "mtime: ";
const DIRECTORY_BEGIN: &str = "begin: ";
const DIRECTORY_END: &str = "end: ";

const SONG_BEGIN: &str = "song_begin: ";
const SONG_END: &str = "song_end";

const PLAYLIST_BEGIN: &str = "playlist_begin: ";
const PLAYLIST_END: &str = "playlist_end";

/// Tag types by their exact name in the file.
fn tag_type_from_file(name: &str) -> Option<TagType> {
    TagType::ALL.iter().copied().find(|t| t.name() == name)
}

pub(crate) fn write_database(tree: &Tree, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}", INFO_BEGIN)?;
    writeln!(out, "{}{}", FORMAT_PREFIX, DB_FORMAT)?;
    writeln!(out, "{}{}", VERSION_PREFIX, env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "{}UTF-8", CHARSET_PREFIX)?;
    for tag_type in TagType::ALL {
        writeln!(out, "{}{}", TAG_PREFIX, tag_type.name())?;
    }
    writeln!(out, "{}", INFO_END)?;
    write_directory(tree, tree.root(), out)
}

fn write_directory(tree: &Tree, id: DirectoryId, out: &mut impl Write) -> io::Result<()> {
    let dir = &tree[id];
    if !dir.is_root() {
        if let Some(kind) = dir.device.name() {
            writeln!(out, "{}{}", DIRECTORY_TYPE, kind)?;
        }
        if let Some(mtime) = dir.mtime {
            writeln!(out, "{}{}", DIRECTORY_MTIME, mtime.timestamp())?;
        }
        writeln!(out, "{}{}", DIRECTORY_BEGIN, dir.path())?;
    }

    for child in dir.children() {
        let child_dir = &tree[*child];
        if child_dir.is_mount() {
            continue;
        }
        writeln!(out, "{}{}", DIRECTORY_DIR, child_dir.name())?;
        write_directory(tree, *child, out)?;
    }

    for song in &dir.songs {
        write_song(song, out)?;
    }

    for playlist in &dir.playlists {
        writeln!(out, "{}{}", PLAYLIST_BEGIN, playlist.name)?;
        if let Some(mtime) = playlist.mtime {
            writeln!(out, "mtime: {}", mtime.timestamp())?;
        }
        writeln!(out, "{}", PLAYLIST_END)?;
    }

    if !dir.is_root() {
        writeln!(out, "{}{}", DIRECTORY_END, dir.path())?;
    }
    Ok(())
}

fn write_song(song: &Song, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}{}", SONG_BEGIN, song.filename)?;
    if let Some(target) = &song.target {
        writeln!(out, "Target: {}", target)?;
    }
    if song.end_ms > 0 {
        writeln!(out, "Range: {}-{}", song.start_ms, song.end_ms)?;
    } else if song.start_ms > 0 {
        writeln!(out, "Range: {}-", song.start_ms)?;
    }
    write_tag(&song.tag, out)?;
    if let Some(format) = song.audio_format.filter(AudioFormat::is_defined) {
        writeln!(out, "Format: {}", format)?;
    }
    if song.in_playlist {
        writeln!(out, "InPlaylist: yes")?;
    }
    if let Some(mtime) = song.mtime {
        writeln!(out, "mtime: {}", mtime.timestamp())?;
    }
    if let Some(added) = song.added {
        writeln!(out, "Added: {}", added.timestamp())?;
    }
    writeln!(out, "{}", SONG_END)
}

fn write_tag(tag: &Tag, out: &mut impl Write) -> io::Result<()> {
    if let Some(duration) = tag.duration() {
        writeln!(out, "Time: {:.3}", duration.as_secs_f64())?;
    }
    if tag.has_playlist() {
        writeln!(out, "Playlist: yes")?;
    }
    for item in tag.items() {
        writeln!(out, "{}: {}", item.tag_type().name(), item.value())?;
    }
    Ok(())
}

struct LineReader<R> {
    inner: R,
    buf: String,
    line: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: String::new(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.inner.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        Ok(Some(self.buf.trim_end_matches(&['\n', '\r'][..]).to_string()))
    }

    /// The next line, failing at end of file.
    fn expect_line(&mut self) -> Result<String> {
        match self.next_line()? {
            Some(line) => Ok(line),
            None => Err(self.error("Unexpected end of file")),
        }
    }

    fn error(&self, message: impl Into<String>) -> DbError {
        DbError::parse(self.line, message)
    }

    fn malformed(&self, line: &str) -> DbError {
        self.error(format!("Malformed line: {:?}", line))
    }

    fn timestamp(&self, value: &str) -> Result<DateTime<Utc>> {
        value
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| self.error(format!("Invalid time stamp: {:?}", value)))
    }
}

/// Read a database file into `tree`, which must be empty.
pub(crate) fn read_database<R: BufRead>(reader: R, tree: &mut Tree) -> Result<()> {
    let mut file = LineReader::new(reader);
    read_header(&mut file)?;
    let root = tree.root();
    read_directory(&mut file, tree, root)
}

fn read_header<R: BufRead>(file: &mut LineReader<R>) -> Result<()> {
    if file.next_line()?.as_deref() != Some(INFO_BEGIN) {
        return Err(file.error("Database corrupted"));
    }

    let mut format = None;
    let mut found_version = false;
    let mut found_charset = false;
    let mut tags = [false; TagType::COUNT];
    loop {
        let line = file.expect_line()?;
        if line == INFO_END {
            break;
        }
        if let Some(value) = line.strip_prefix(FORMAT_PREFIX) {
            format = value.trim().parse::<u32>().ok();
        } else if line.starts_with(VERSION_PREFIX) {
            if found_version {
                return Err(file.error("Duplicate version line"));
            }
            found_version = true;
        } else if let Some(charset) = line.strip_prefix(CHARSET_PREFIX) {
            if found_charset {
                return Err(file.error("Duplicate charset line"));
            }
            found_charset = true;
            if charset != "UTF-8" {
                return Err(file.error(format!(
                    "Existing database has charset \"{}\" instead of \"UTF-8\"; discarding database file",
                    charset
                )));
            }
        } else if let Some(name) = line.strip_prefix(TAG_PREFIX) {
            let tag_type = tag_type_from_file(name).ok_or_else(|| {
                file.error(format!("Unrecognized tag '{}', discarding database file", name))
            })?;
            tags[tag_type.index()] = true;
        } else {
            return Err(file.malformed(&line));
        }
    }

    if format != Some(DB_FORMAT) {
        return Err(file.error("Database format mismatch, discarding database file"));
    }
    if tags.iter().any(|present| !present) {
        return Err(file.error("Tag list mismatch, discarding database file"));
    }
    Ok(())
}

fn check_name<R: BufRead>(file: &LineReader<R>, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(file.error(format!("Invalid name: {:?}", name)));
    }
    Ok(())
}

fn read_directory<R: BufRead>(
    file: &mut LineReader<R>,
    tree: &mut Tree,
    id: DirectoryId,
) -> Result<()> {
    let is_root = tree[id].is_root();
    loop {
        let line = match file.next_line()? {
            Some(line) => line,
            None if is_root => return Ok(()),
            None => return Err(file.error("Unexpected end of file")),
        };

        if line.starts_with(DIRECTORY_END) && !is_root {
            return Ok(());
        }

        if let Some(name) = line.strip_prefix(DIRECTORY_DIR) {
            check_name(file, name)?;
            if tree.find_child(id, name).is_some() {
                return Err(file.error(format!("Duplicate subdirectory '{}'", name)));
            }
            let child = tree.create_child(id, name);
            read_subdirectory(file, tree, child)?;
        } else if let Some(name) = line.strip_prefix(SONG_BEGIN) {
            check_name(file, name)?;
            if tree.find_song(id, name).is_some() {
                return Err(file.error(format!("Duplicate song '{}'", name)));
            }
            let song = read_song(file, name)?;
            tree.add_song(id, song);
        } else if let Some(name) = line.strip_prefix(PLAYLIST_BEGIN) {
            let playlist = read_playlist(file, name)?;
            tree[id].playlists.push(playlist);
        } else {
            return Err(file.malformed(&line));
        }
    }
}

/// Attributes of a subdirectory up to its `begin:` line, then its contents.
fn read_subdirectory<R: BufRead>(
    file: &mut LineReader<R>,
    tree: &mut Tree,
    id: DirectoryId,
) -> Result<()> {
    loop {
        let line = file.expect_line()?;
        if let Some(value) = line.strip_prefix(DIRECTORY_MTIME) {
            tree[id].mtime = Some(file.timestamp(value)?);
        } else if let Some(kind) = line.strip_prefix(DIRECTORY_TYPE) {
            tree[id].device = DeviceKind::from_name(kind)
                .ok_or_else(|| file.error(format!("Unknown directory type: {:?}", kind)))?;
        } else if line.starts_with(DIRECTORY_BEGIN) {
            return read_directory(file, tree, id);
        } else {
            return Err(file.malformed(&line));
        }
    }
}

fn read_song<R: BufRead>(file: &mut LineReader<R>, name: &str) -> Result<Song> {
    let mut song = Song::new(name);
    let mut tag = TagBuilder::new();
    loop {
        let line = file.expect_line()?;
        if line == SONG_END {
            break;
        }
        let Some((key, value)) = line.split_once(':').filter(|(key, _)| !key.is_empty()) else {
            return Err(file.error(format!("unknown line in db: {}", line)));
        };
        let value = value.trim_start();

        if let Some(tag_type) = tag_type_from_file(key) {
            tag.add_item(tag_type, value);
            continue;
        }
        match key {
            "Time" => {
                let duration = value
                    .parse::<f64>()
                    .ok()
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                    .ok_or_else(|| file.error(format!("Invalid duration: {:?}", value)))?;
                tag.set_duration(Some(duration));
            }
            "Playlist" => {
                tag.set_has_playlist(value == "yes");
            }
            "Target" => song.target = Some(value.to_string()),
            // Formats this build cannot represent are dropped, not fatal
            "Format" => song.audio_format = AudioFormat::parse(value, false).ok(),
            "InPlaylist" => song.in_playlist = value == "yes",
            "mtime" => song.mtime = Some(file.timestamp(value)?),
            "Added" => song.added = Some(file.timestamp(value)?),
            "Range" => {
                let (start, end) = parse_range(value)
                    .ok_or_else(|| file.error(format!("Invalid range: {:?}", value)))?;
                song.start_ms = start;
                song.end_ms = end;
            }
            _ => return Err(file.error(format!("unknown line in db: {}", line))),
        }
    }
    song.tag = tag.commit();
    Ok(song)
}

/// `start-end` or `start-`, in milliseconds.
fn parse_range(value: &str) -> Option<(u32, u32)> {
    let (start, end) = value.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() { 0 } else { end.parse().ok()? };
    Some((start, end))
}

fn read_playlist<R: BufRead>(file: &mut LineReader<R>, name: &str) -> Result<PlaylistInfo> {
    let mut playlist = PlaylistInfo::new(name, None);
    loop {
        let line = file.expect_line()?;
        if line == PLAYLIST_END {
            return Ok(playlist);
        }
        match line.strip_prefix("mtime: ") {
            Some(value) => playlist.mtime = Some(file.timestamp(value)?),
            None => return Err(file.error(format!("Unknown line in db: {}", line))),
        }
    }
}
