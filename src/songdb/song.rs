//! Songs and the transient views handed out to visitors.
//!
//! A [`Song`] is owned by exactly one directory of the catalog and only knows
//! its file name. Code outside the tree works with [`LightSong`], a detached
//! snapshot that also carries the directory path (and, for CUE sub-songs, the
//! tag merged with the container file's).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{DbError, Result};
use crate::tag::Tag;

/// Sample format component of an [`AudioFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Unknown, or `*` in a mask.
    #[default]
    Undefined,
    S8,
    S16,
    /// 24 bit samples in 32 bit words.
    S24P32,
    S32,
    Float,
    Dsd,
}

impl SampleFormat {
    fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Undefined => "*",
            SampleFormat::S8 => "8",
            SampleFormat::S16 => "16",
            SampleFormat::S24P32 => "24",
            SampleFormat::S32 => "32",
            SampleFormat::Float => "f",
            SampleFormat::Dsd => "dsd",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "*" => SampleFormat::Undefined,
            "8" => SampleFormat::S8,
            "16" => SampleFormat::S16,
            "24" => SampleFormat::S24P32,
            "32" => SampleFormat::S32,
            "f" => SampleFormat::Float,
            "dsd" => SampleFormat::Dsd,
            _ => return None,
        })
    }
}

/// `sample_rate:format:channels`, e.g. `44100:16:2`. A zero rate or channel
/// count means "undefined", which a mask writes as `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub channels: u8,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, format: SampleFormat, channels: u8) -> Self {
        Self {
            sample_rate,
            format,
            channels,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.sample_rate != 0 && self.format != SampleFormat::Undefined && self.channels != 0
    }

    /// Parse a format; with `mask`, any component may be `*`.
    pub fn parse(s: &str, mask: bool) -> Result<Self> {
        let invalid = || DbError::Filter(format!("Invalid audio format: {}", s));
        let mut parts = s.split(':');
        let (Some(rate), Some(format), Some(channels), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let sample_rate = match rate {
            "*" if mask => 0,
            _ => rate.parse::<u32>().ok().filter(|r| *r > 0).ok_or_else(invalid)?,
        };
        let format = match SampleFormat::parse(format) {
            Some(SampleFormat::Undefined) if !mask => return Err(invalid()),
            Some(f) => f,
            None => return Err(invalid()),
        };
        let channels = match channels {
            "*" if mask => 0,
            _ => channels.parse::<u8>().ok().filter(|c| *c > 0).ok_or_else(invalid)?,
        };
        Ok(Self::new(sample_rate, format, channels))
    }

    /// Whether this format fits `mask`, where undefined mask fields match anything.
    pub fn matches_mask(&self, mask: &AudioFormat) -> bool {
        (mask.sample_rate == 0 || mask.sample_rate == self.sample_rate)
            && (mask.format == SampleFormat::Undefined || mask.format == self.format)
            && (mask.channels == 0 || mask.channels == self.channels)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sample_rate == 0 {
            f.write_str("*")?;
        } else {
            write!(f, "{}", self.sample_rate)?;
        }
        write!(f, ":{}:", self.format.as_str())?;
        if self.channels == 0 {
            f.write_str("*")
        } else {
            write!(f, "{}", self.channels)
        }
    }
}

impl FromStr for AudioFormat {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, false)
    }
}

/// A song stored in the catalog.
#[derive(Debug, Clone, Default)]
pub struct Song {
    /// File name relative to the owning directory.
    pub filename: String,
    /// Where the audio really lives, if not at `filename`. Relative targets
    /// may start with `../` to point into the parent directory.
    pub target: Option<String>,
    pub tag: Tag,
    pub mtime: Option<DateTime<Utc>>,
    pub added: Option<DateTime<Utc>>,
    /// Start of the sub-song within the file, in milliseconds.
    pub start_ms: u32,
    /// End of the sub-song, or 0 for "until the end of the file".
    pub end_ms: u32,
    pub audio_format: Option<AudioFormat>,
    /// Set if this song is referenced by a playlist in the same directory.
    pub in_playlist: bool,
}

impl Song {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_mtime(mut self, mtime: DateTime<Utc>) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

/// A detached view of a song, as passed to visitors.
#[derive(Debug, Clone, PartialEq)]
pub struct LightSong {
    /// Path of the directory containing the song; `None` at the root.
    pub directory: Option<String>,
    /// File name relative to `directory`.
    pub uri: String,
    pub real_uri: Option<String>,
    pub tag: Tag,
    pub mtime: Option<DateTime<Utc>>,
    pub added: Option<DateTime<Utc>>,
    pub start_ms: u32,
    pub end_ms: u32,
    pub audio_format: Option<AudioFormat>,
    /// Queue priority; always 0 for catalog songs.
    pub priority: u8,
}

impl LightSong {
    pub fn new(song: &Song, directory: Option<&str>) -> Self {
        Self {
            directory: directory.map(str::to_string),
            uri: song.filename.clone(),
            real_uri: song.target.clone(),
            tag: song.tag.clone(),
            mtime: song.mtime,
            added: song.added,
            start_ms: song.start_ms,
            end_ms: song.end_ms,
            audio_format: song.audio_format,
            priority: 0,
        }
    }

    /// Full URI relative to the catalog root.
    pub fn get_uri(&self) -> String {
        match &self.directory {
            Some(dir) => format!("{}/{}", dir, self.uri),
            None => self.uri.clone(),
        }
    }

    /// Re-base this view under `base`, as seen from an enclosing catalog.
    pub(crate) fn prefixed(&self, base: &str) -> Self {
        let mut song = self.clone();
        song.directory = Some(match self.directory.as_deref() {
            Some(dir) if !dir.is_empty() => format!("{}/{}", base, dir),
            _ => base.to_string(),
        });
        song
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_format_parse_and_display() {
        let af: AudioFormat = "44100:16:2".parse().unwrap();
        assert_eq!(af, AudioFormat::new(44100, SampleFormat::S16, 2));
        assert_eq!(af.to_string(), "44100:16:2");
        assert!(af.is_defined());

        let dsd = AudioFormat::parse("2822400:dsd:2", false).unwrap();
        assert_eq!(dsd.format, SampleFormat::Dsd);
    }

    #[test]
    fn test_audio_format_mask() {
        let mask = AudioFormat::parse("*:24:*", true).unwrap();
        assert_eq!(mask.to_string(), "*:24:*");
        assert!(AudioFormat::new(96000, SampleFormat::S24P32, 2).matches_mask(&mask));
        assert!(!AudioFormat::new(96000, SampleFormat::S16, 2).matches_mask(&mask));
    }

    #[test]
    fn test_audio_format_rejects_garbage() {
        assert!(AudioFormat::parse("44100:16", false).is_err());
        assert!(AudioFormat::parse("*:16:2", false).is_err());
        assert!(AudioFormat::parse("44100:12:2", true).is_err());
        assert!(AudioFormat::parse("44100:16:2:1", true).is_err());
    }

    #[test]
    fn test_light_song_uri() {
        let song = Song::new("a.mp3");
        assert_eq!(LightSong::new(&song, None).get_uri(), "a.mp3");
        assert_eq!(LightSong::new(&song, Some("music/A")).get_uri(), "music/A/a.mp3");
    }

    #[test]
    fn test_prefixed() {
        let song = Song::new("x.flac");
        let root_song = LightSong::new(&song, None).prefixed("remote");
        assert_eq!(root_song.get_uri(), "remote/x.flac");
        let nested = LightSong::new(&song, Some("sub")).prefixed("remote");
        assert_eq!(nested.get_uri(), "remote/sub/x.flac");
    }
}
