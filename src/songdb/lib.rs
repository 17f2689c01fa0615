//! # Songdb Architecture
//!
//! Songdb is a **song catalog library**: a tree of directories holding songs
//! and playlists, queried through a small filter language and persisted to a
//! single text file. Other catalogs can be mounted anywhere in the tree and
//! are queried transparently.
//!
//! ## The Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Database (database/)                                       │
//! │  - The Database trait: open, visit, get_song, close         │
//! │  - SimpleDatabase: in-memory tree + text file, mounts       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Queries (selection.rs, filter/, visitor.rs)                │
//! │  - DatabaseSelection: where to look and what to keep        │
//! │  - SongFilter: parsed filter expressions                    │
//! │  - DatabaseVisitorHelper: sorting and windows               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Tree (directory/)                                          │
//! │  - Arena of directories, songs and playlists                │
//! │  - Lookup, sort, prune, the depth-first walk                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Metadata (tag/, song.rs, collate.rs)                       │
//! │  - Interned tag items, immutable tags, the tag builder      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Querying
//!
//! ```no_run
//! use songdb::{Database, DatabaseSelection, LightSong, SimpleDatabase, SongFilter, VisitSongs};
//!
//! # fn main() -> songdb::Result<()> {
//! let db = SimpleDatabase::new("/var/cache/songdb/db");
//! db.open()?;
//!
//! let filter = SongFilter::parse_expression(r#"(Artist == "X")"#)?;
//! let selection = DatabaseSelection::new("music", true, Some(&filter));
//! db.visit(&selection, &mut VisitSongs::new(|song: &LightSong| {
//!     println!("{}", song.get_uri());
//!     Ok(())
//! }))?;
//!
//! db.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A [`SimpleDatabase`] guards its whole tree with one mutex. Walks hold it
//! while visiting native nodes and release it while a mounted database runs,
//! so a mounted database may itself be queried or mounted into freely.
//!
//! ## Module Overview
//!
//! - [`database`]: The `Database` trait, `SimpleDatabase`, the file format
//! - [`directory`]: The directory tree and its walk
//! - [`filter`]: Song filters and their expression syntax
//! - [`selection`]: Query descriptions
//! - [`visitor`]: Result visitors, sorting and windows
//! - [`song`]: Songs and audio formats
//! - [`tag`]: Tag types, the interning pool, tags and the tag builder
//! - [`collate`]: Case and accent insensitive ordering
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod collate;
pub mod config;
pub mod database;
pub mod directory;
pub mod error;
pub mod filter;
pub mod selection;
pub mod song;
pub mod tag;
pub mod visitor;

pub use config::DatabaseConfig;
pub use database::{Database, DatabaseStats, SimpleDatabase, UniqueTags};
pub use directory::{DirectoryId, LightDirectory, PlaylistInfo, Tree};
pub use error::{DbError, ErrorCode, Result};
pub use filter::SongFilter;
pub use selection::{DatabaseSelection, SortOrder};
pub use song::{AudioFormat, LightSong, Song};
pub use tag::{Tag, TagBuilder, TagType};
pub use visitor::{DatabaseVisitor, DatabaseVisitorHelper, VisitSongs};
