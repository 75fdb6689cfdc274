//! Per-track usage statistics and the recommendation ranking built on them.
//!
//! Stats entries are created lazily with zeroed counters on the first event
//! for a track and are never deleted. The whole mapping is loaded once at
//! construction and written back after every mutation. Storage failures are
//! logged and otherwise ignored: the in-memory mapping stays authoritative
//! for the session.

use crate::algorithm::{self, ScoringContext};
use crate::config::PREFERENCES_NAMESPACE;
use crate::db::KeyValueStore;
use crate::track::Track;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Usage statistics of one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SongStats {
    /// Incremented every time playback of the track starts.
    pub play_count: u32,
    /// Incremented when the track is abandoned for the next one.
    pub skip_count: u32,
    /// Incremented each time a looped track completes another cycle.
    pub repeat_count: u32,
    /// Epoch millis of the most recent play start. Zero means never.
    pub last_played: i64,
    /// Accumulated listened time in millis.
    pub total_play_duration: u64,
    /// `total_play_duration / max(play_count, 1)`.
    pub average_play_duration: f64,
}

/// On-storage shape of the preferences namespace.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedPreferences {
    #[serde(default)]
    song_stats: HashMap<String, SongStats>,
}

/// Current wall-clock time in epoch millis.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Owner of the statistics mapping.
pub struct PreferenceService {
    song_stats: HashMap<String, SongStats>,
    store: Box<dyn KeyValueStore>,
    context: ScoringContext,
}

impl std::fmt::Debug for PreferenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceService")
            .field("tracked_songs", &self.song_stats.len())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl PreferenceService {
    /// Load the statistics mapping from `store`. A missing or unreadable
    /// document starts an empty mapping.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        let song_stats = match load_song_stats(store.as_ref()) {
            Ok(stats) => {
                debug!("Loaded statistics for {} songs", stats.len());
                stats
            }
            Err(err) => {
                warn!("Starting with empty statistics: {err:#}");
                HashMap::new()
            }
        };

        Self {
            song_stats,
            store,
            context: ScoringContext::default(),
        }
    }

    /// Replace the scoring weights.
    #[must_use]
    pub fn with_context(mut self, context: ScoringContext) -> Self {
        self.context = context;
        self
    }

    /// Stats for `song_id`, if any event was ever recorded for it.
    pub fn stats(&self, song_id: &str) -> Option<&SongStats> {
        self.song_stats.get(song_id)
    }

    /// The whole mapping.
    pub fn all_stats(&self) -> &HashMap<String, SongStats> {
        &self.song_stats
    }

    pub fn update_play_count(&mut self, song_id: &str) {
        self.update_play_count_at(song_id, now_millis());
    }

    /// Record a play start at `now` (epoch millis).
    pub fn update_play_count_at(&mut self, song_id: &str, now: i64) {
        self.mutate(song_id, |stats| {
            stats.play_count = stats.play_count.saturating_add(1);
            stats.last_played = now;
        });
    }

    pub fn update_skip_count(&mut self, song_id: &str) {
        self.mutate(song_id, |stats| {
            stats.skip_count = stats.skip_count.saturating_add(1);
        });
    }

    pub fn update_repeat_count(&mut self, song_id: &str) {
        self.mutate(song_id, |stats| {
            stats.repeat_count = stats.repeat_count.saturating_add(1);
        });
    }

    /// Add `elapsed_ms` of listening and recompute the average. The divisor
    /// is the play count floored to one.
    pub fn update_play_duration(&mut self, song_id: &str, elapsed_ms: u64) {
        self.mutate(song_id, |stats| {
            stats.total_play_duration = stats.total_play_duration.saturating_add(elapsed_ms);
            let plays = stats.play_count.max(1);
            stats.average_play_duration = stats.total_play_duration as f64 / f64::from(plays);
        });
    }

    /// `tracks` reordered by descending score, ties in input order.
    pub fn get_recommendations(&self, tracks: &[Track]) -> Vec<Track> {
        self.get_recommendations_at(tracks, now_millis())
    }

    pub fn get_recommendations_at(&self, tracks: &[Track], now: i64) -> Vec<Track> {
        algorithm::rank_tracks(tracks, &self.song_stats, now, &self.context)
    }

    fn mutate(&mut self, song_id: &str, update: impl FnOnce(&mut SongStats)) {
        update(self.song_stats.entry(song_id.to_string()).or_default());
        self.persist();
    }

    fn persist(&self) {
        if let Err(err) = save_song_stats(self.store.as_ref(), &self.song_stats) {
            warn!("Failed to persist preferences: {err:#}");
        }
    }
}

fn load_song_stats(store: &dyn KeyValueStore) -> Result<HashMap<String, SongStats>> {
    let Some(raw) = store.load(PREFERENCES_NAMESPACE)? else {
        return Ok(HashMap::new());
    };

    let persisted: PersistedPreferences = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse `{PREFERENCES_NAMESPACE}' document"))?;
    Ok(persisted.song_stats)
}

fn save_song_stats(store: &dyn KeyValueStore, song_stats: &HashMap<String, SongStats>) -> Result<()> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Borrowed<'a> {
        song_stats: &'a HashMap<String, SongStats>,
    }

    let json = serde_json::to_string(&Borrowed { song_stats })?;
    store.save(PREFERENCES_NAMESPACE, &json)
}
