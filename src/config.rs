//! # Configuration Module
//!
//! Fixed playback constants plus the runtime paths Playwise needs.
//!
//! ## Data Storage
//!
//! Listening statistics live in a SQLite database under the platform data
//! directory:
//! - Linux: `~/.local/share/playwise/`
//! - macOS: `~/Library/Application Support/playwise/`
//! - Windows: `%APPDATA%\playwise\`
//!
//! The constants below are not user-editable at runtime.

use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Tracks shorter than this are never listed or played.
pub const MIN_SONG_DURATION_MS: u64 = 30_000;

/// Number of opened audio handles kept around at once.
pub const SOUND_CACHE_CAPACITY: usize = 3;

/// Granularity of position/duration reports from an active handle.
pub const PROGRESS_UPDATE_INTERVAL_MS: u64 = 100;

/// Upper bound on the number of assets taken from the media source.
pub const MAX_LIBRARY_ASSETS: usize = 2000;

/// Storage namespace holding the whole statistics mapping.
pub const PREFERENCES_NAMESPACE: &str = "user-preferences";

/// Decay constant of the recency term: one week.
pub const RECENCY_WINDOW_MS: f64 = 1000.0 * 60.0 * 60.0 * 24.0 * 7.0;

/// How many recommendations a front end shows by default.
pub const RECOMMENDATION_PREVIEW_LEN: usize = 5;

/// Playback configuration handed to the audio backend on every open.
///
/// Background and silent-mode flags only mean something on mobile
/// platforms; desktop backends accept and ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub plays_in_silent_mode: bool,
    pub stays_active_in_background: bool,
    pub should_duck_others: bool,
    pub should_correct_pitch: bool,
    pub progress_update_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            plays_in_silent_mode: true,
            stays_active_in_background: true,
            should_duck_others: true,
            should_correct_pitch: true,
            progress_update_interval_ms: PROGRESS_UPDATE_INTERVAL_MS,
        }
    }
}

/// Returns the platform-appropriate data directory for Playwise, creating it
/// when missing.
///
/// # Errors
///
/// Fails when the system data directory cannot be determined or the
/// `playwise` subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let playwise_dir = data_dir.join("playwise");
    fs::create_dir_all(&playwise_dir).with_context(|| {
        format!(
            "Failed to create Playwise data directory at {}. Please check file permissions.",
            playwise_dir.display()
        )
    })?;

    Ok(playwise_dir)
}

/// Returns the path of the preferences database (`preferences.db`).
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("preferences.db"))
}

/// Default music directory: the platform audio directory, else `~/Music`.
pub fn default_music_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Music")))
        .unwrap_or_else(|| PathBuf::from("Music"))
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the preferences database
    pub db_path: PathBuf,
    /// Root of the music library
    pub music_dir: PathBuf,
    /// Playback settings used for every opened handle
    #[serde(default)]
    pub audio: AudioConfig,
}

impl RuntimeConfig {
    /// Build the configuration from platform defaults.
    pub fn new() -> Result<Self> {
        Ok(Self {
            db_path: get_db_path()?,
            music_dir: absolutize(&default_music_dir())?,
            audio: AudioConfig::default(),
        })
    }

    /// Create configuration with explicit paths. Either may be `None` to use
    /// the platform default.
    pub fn with_paths(db_path: Option<PathBuf>, music_dir: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(path) => absolutize(&path)?,
            None => get_db_path()?,
        };
        let music_dir = absolutize(&music_dir.unwrap_or_else(default_music_dir))?;

        Ok(Self {
            db_path,
            music_dir,
            audio: AudioConfig::default(),
        })
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .with_context(|| format!("Failed to resolve path {}", path.display()))?
        .into_owned())
}
