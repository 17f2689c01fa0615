use crate::error::{DbError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "songdb.json";
const DEFAULT_DB_FILENAME: &str = "songdb";

/// Configuration for a [`crate::database::SimpleDatabase`], stored as
/// `songdb.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// The database file
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Gzip the database file on save
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Where cache-backed mounts keep their database files
    #[serde(default)]
    pub cache_directory: Option<PathBuf>,

    /// Skip songs that are referenced by a playlist in the same directory
    #[serde(default = "default_true")]
    pub hide_playlist_targets: bool,
}

fn default_path() -> PathBuf {
    ProjectDirs::from("", "", "songdb")
        .map(|dirs| dirs.cache_dir().join(DEFAULT_DB_FILENAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILENAME))
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(default_path())
    }
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            compress: true,
            cache_directory: None,
            hide_playlist_targets: true,
        }
    }

    /// Load config from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(DbError::Io)?;
        let config: DatabaseConfig =
            serde_json::from_str(&content).map_err(DbError::Serialization)?;
        Ok(config)
    }

    /// Save config to the given directory
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).map_err(DbError::Io)?;
        }

        let config_path = config_dir.join(CONFIG_FILENAME);
        let content = serde_json::to_string_pretty(self).map_err(DbError::Serialization)?;
        fs::write(config_path, content).map_err(DbError::Io)?;
        Ok(())
    }
}
