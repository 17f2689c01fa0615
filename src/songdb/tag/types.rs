use std::fmt;

/// The closed set of metadata types a [`super::Tag`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TagType {
    Artist,
    ArtistSort,
    Album,
    AlbumSort,
    AlbumArtist,
    AlbumArtistSort,
    Title,
    TitleSort,
    Track,
    Name,
    Genre,
    Mood,
    Date,
    OriginalDate,
    Composer,
    ComposerSort,
    Performer,
    Conductor,
    Work,
    Movement,
    MovementNumber,
    Ensemble,
    Location,
    Grouping,
    Comment,
    Disc,
    Label,
    MusicBrainzArtistId,
    MusicBrainzAlbumId,
    MusicBrainzAlbumArtistId,
    MusicBrainzTrackId,
    MusicBrainzReleaseTrackId,
    MusicBrainzWorkId,
}

impl TagType {
    pub const ALL: [TagType; 33] = [
        TagType::Artist,
        TagType::ArtistSort,
        TagType::Album,
        TagType::AlbumSort,
        TagType::AlbumArtist,
        TagType::AlbumArtistSort,
        TagType::Title,
        TagType::TitleSort,
        TagType::Track,
        TagType::Name,
        TagType::Genre,
        TagType::Mood,
        TagType::Date,
        TagType::OriginalDate,
        TagType::Composer,
        TagType::ComposerSort,
        TagType::Performer,
        TagType::Conductor,
        TagType::Work,
        TagType::Movement,
        TagType::MovementNumber,
        TagType::Ensemble,
        TagType::Location,
        TagType::Grouping,
        TagType::Comment,
        TagType::Disc,
        TagType::Label,
        TagType::MusicBrainzArtistId,
        TagType::MusicBrainzAlbumId,
        TagType::MusicBrainzAlbumArtistId,
        TagType::MusicBrainzTrackId,
        TagType::MusicBrainzReleaseTrackId,
        TagType::MusicBrainzWorkId,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Canonical name, as used in filter expressions and database files.
    pub fn name(self) -> &'static str {
        match self {
            TagType::Artist => "Artist",
            TagType::ArtistSort => "ArtistSort",
            TagType::Album => "Album",
            TagType::AlbumSort => "AlbumSort",
            TagType::AlbumArtist => "AlbumArtist",
            TagType::AlbumArtistSort => "AlbumArtistSort",
            TagType::Title => "Title",
            TagType::TitleSort => "TitleSort",
            TagType::Track => "Track",
            TagType::Name => "Name",
            TagType::Genre => "Genre",
            TagType::Mood => "Mood",
            TagType::Date => "Date",
            TagType::OriginalDate => "OriginalDate",
            TagType::Composer => "Composer",
            TagType::ComposerSort => "ComposerSort",
            TagType::Performer => "Performer",
            TagType::Conductor => "Conductor",
            TagType::Work => "Work",
            TagType::Movement => "Movement",
            TagType::MovementNumber => "MovementNumber",
            TagType::Ensemble => "Ensemble",
            TagType::Location => "Location",
            TagType::Grouping => "Grouping",
            TagType::Comment => "Comment",
            TagType::Disc => "Disc",
            TagType::Label => "Label",
            TagType::MusicBrainzArtistId => "MUSICBRAINZ_ARTISTID",
            TagType::MusicBrainzAlbumId => "MUSICBRAINZ_ALBUMID",
            TagType::MusicBrainzAlbumArtistId => "MUSICBRAINZ_ALBUMARTISTID",
            TagType::MusicBrainzTrackId => "MUSICBRAINZ_TRACKID",
            TagType::MusicBrainzReleaseTrackId => "MUSICBRAINZ_RELEASETRACKID",
            TagType::MusicBrainzWorkId => "MUSICBRAINZ_WORKID",
        }
    }

    /// Look up a tag type by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<TagType> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Whether values of this type are numbers that sort numerically.
    pub fn is_numeric(self) -> bool {
        matches!(self, TagType::Track | TagType::Disc)
    }

    /// The plain type a `*Sort` type decays to.
    pub fn decay_sort(self) -> TagType {
        match self {
            TagType::ArtistSort => TagType::Artist,
            TagType::AlbumSort => TagType::Album,
            TagType::AlbumArtistSort => TagType::AlbumArtist,
            TagType::TitleSort => TagType::Title,
            TagType::ComposerSort => TagType::Composer,
            other => other,
        }
    }

    /// Types consulted, in order, when a tag lacks this type entirely.
    ///
    /// Fallbacks only ever go from the more specific type to the more general
    /// one: `AlbumArtist` falls back to `Artist`, never the other way round.
    pub fn fallbacks(self) -> &'static [TagType] {
        match self {
            TagType::AlbumArtistSort => &[
                TagType::AlbumArtist,
                TagType::ArtistSort,
                TagType::Artist,
            ],
            TagType::AlbumArtist => &[TagType::Artist],
            TagType::ArtistSort => &[TagType::Artist],
            TagType::AlbumSort => &[TagType::Album],
            TagType::TitleSort => &[TagType::Title],
            TagType::ComposerSort => &[TagType::Composer],
            TagType::MusicBrainzAlbumArtistId => &[TagType::MusicBrainzArtistId],
            _ => &[],
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
