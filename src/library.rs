//! Track sources and library browsing helpers.
//!
//! A [`MediaSource`] answers two questions: may we read the media library,
//! and what audio assets does it hold. [`DirectorySource`] answers them for a
//! directory tree on disk.

use crate::config::MIN_SONG_DURATION_MS;
use crate::track::Track;
use anyhow::{Context, Result};
use lofty::prelude::*;
use log::{debug, trace};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Audio file extensions picked up by [`DirectorySource`].
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "opus", "m4a", "aac", "wav"];

/// Image names tried, in order, as cover art next to a track.
const COVER_STEMS: &[&str] = &["cover", "folder", "front", "album"];
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Provider of the enumerated track list.
pub trait MediaSource {
    /// Ask for access to the media library. `false` means denied.
    fn request_access(&mut self) -> bool;

    /// Audio assets sorted by creation time, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Fails when the library cannot be listed.
    fn enumerate(&mut self, limit: usize) -> Result<Vec<Track>>;
}

/// Media library rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MediaSource for DirectorySource {
    fn request_access(&mut self) -> bool {
        let granted = self.root.is_dir() && fs::read_dir(&self.root).is_ok();
        if !granted {
            debug!("No read access to {}", self.root.display());
        }
        granted
    }

    fn enumerate(&mut self, limit: usize) -> Result<Vec<Track>> {
        let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_audio_file(path) {
                continue;
            }
            let created = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.created().or_else(|_| meta.modified()).ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path.to_path_buf(), created));
        }

        // Stable sort: equal timestamps stay in walk order.
        files.sort_by_key(|(_, created)| *created);
        files.truncate(limit);

        let tracks: Vec<Track> = files.into_par_iter().map(|(path, _)| probe_track(&path)).collect();
        debug!("Enumerated {} tracks under {}", tracks.len(), self.root.display());
        Ok(tracks)
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Read duration and title from the file's tags. Unreadable files get a
/// zero duration, which keeps them out of the playable list.
fn probe_track(path: &Path) -> Track {
    let fallback_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("UNKNOWN")
        .to_string();

    let (name, duration_secs) = match lofty::read_from_path(path) {
        Ok(tagged) => {
            let duration = tagged.properties().duration().as_secs_f64();
            let title = tagged
                .primary_tag()
                .or_else(|| tagged.first_tag())
                .and_then(|tag| tag.title().map(|t| t.trim().to_string()))
                .filter(|t| !t.is_empty());
            (title.unwrap_or(fallback_name), duration)
        }
        Err(err) => {
            trace!("No tags for {}: {err}", path.display());
            (fallback_name, 0.0)
        }
    };

    let track = Track::new(path.to_string_lossy(), path, name, duration_secs);
    match find_cover_art(path) {
        Some(cover) => track.with_artwork(cover),
        None => track,
    }
}

fn find_cover_art(track_path: &Path) -> Option<PathBuf> {
    let dir = track_path.parent()?;
    COVER_STEMS
        .iter()
        .flat_map(|stem| COVER_EXTENSIONS.iter().map(move |ext| dir.join(format!("{stem}.{ext}"))))
        .find(|candidate| candidate.is_file())
}

/// Whether `track` is long enough to be treated as a song rather than a
/// notification sound or voice memo.
pub fn is_playable(track: &Track) -> bool {
    track.duration_millis() >= MIN_SONG_DURATION_MS
}

/// How to order a track listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Case-insensitive display name.
    #[default]
    Name,
    /// Shortest first.
    Duration,
}

/// Tracks whose display name contains `query`, ignoring case. An empty
/// query matches everything.
pub fn search_tracks<'a>(tracks: &'a [Track], query: &str) -> Vec<&'a Track> {
    let needle = query.trim().to_lowercase();
    tracks
        .iter()
        .filter(|track| needle.is_empty() || track.name.to_lowercase().contains(&needle))
        .collect()
}

/// Stable in-place sort.
pub fn sort_tracks(tracks: &mut [&Track], key: SortKey) {
    match key {
        SortKey::Name => tracks.sort_by_key(|track| track.name.to_lowercase()),
        SortKey::Duration => tracks.sort_by(|a, b| {
            a.duration_secs
                .partial_cmp(&b.duration_secs)
                .unwrap_or(Ordering::Equal)
        }),
    }
}

/// Render milliseconds as `m:ss`.
pub fn format_time(millis: u64) -> String {
    let total_secs = millis / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}
