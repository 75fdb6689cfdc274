//! # Playback orchestration
//!
//! [`PlayerService`] owns the playback session, the bounded handle cache and
//! the [`PreferenceService`], and is the only writer of all three. Every
//! operation runs to completion before the next one starts, so no locking is
//! involved.
//!
//! ## Session lifecycle
//!
//! ```text
//! Idle -> Loading -> Playing <-> Paused -> (finished) -> Loading(next) -> ...
//! ```
//!
//! ## Progress
//!
//! The driver calls [`PlayerService::poll`] every
//! [`PROGRESS_UPDATE_INTERVAL_MS`](crate::config::PROGRESS_UPDATE_INTERVAL_MS).
//! Each poll reads the active handle into a [`ProgressUpdate`] stamped with
//! the session generation. Every `play_song` bumps the generation, so an
//! update read from a superseded handle is recognised and dropped.
//!
//! ## Failure policy
//!
//! No operation returns an error. Collaborator failures are logged; a
//! failure while starting a track tears the session down to idle.

use crate::audio::{AudioBackend, AudioHandle, HandleStatus, OpenOptions};
use crate::cache::SoundCache;
use crate::config::{AudioConfig, MAX_LIBRARY_ASSETS, SOUND_CACHE_CAPACITY};
use crate::library::{self, MediaSource};
use crate::preferences::PreferenceService;
use crate::track::Track;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;

/// Policy for resolving the next and previous track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Walk the library in enumeration order, wrapping at both ends.
    #[default]
    Sequential,
    /// Pick uniformly among the other tracks.
    Shuffle,
    /// Repeat the current track natively.
    LoopTrack,
}

impl PlaybackMode {
    /// The fixed cycle Sequential -> Shuffle -> LoopTrack -> Sequential.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Sequential => Self::Shuffle,
            Self::Shuffle => Self::LoopTrack,
            Self::LoopTrack => Self::Sequential,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Shuffle => "shuffle",
            Self::LoopTrack => "loop_track",
        }
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sequential" => Ok(Self::Sequential),
            "shuffle" => Ok(Self::Shuffle),
            "loop_track" | "loop" => Ok(Self::LoopTrack),
            other => Err(anyhow::anyhow!(
                "Unknown playback mode: {other}. Use 'sequential', 'shuffle' or 'loop-track'"
            )),
        }
    }
}

/// Coarse state derived from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Ephemeral playback state. Nothing here is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    /// Playable tracks in enumeration order.
    pub songs: Vec<Track>,
    pub current_song: Option<Track>,
    pub is_playing: bool,
    pub is_loading: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    /// Always within `[0, 1]`.
    pub volume: f32,
    pub playback_mode: PlaybackMode,
    /// Reserved for an explicit up-next ordering; not consulted yet.
    pub queue: Vec<Track>,
    /// `songs` ranked by the preference service.
    pub recommendations: Vec<Track>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            songs: Vec::new(),
            current_song: None,
            is_playing: false,
            is_loading: false,
            position_ms: 0,
            duration_ms: 0,
            volume: 1.0,
            playback_mode: PlaybackMode::default(),
            queue: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// A progress report tagged with the generation of the handle it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub generation: u64,
    pub status: HandleStatus,
}

/// Handle of the track currently owned by the session.
#[derive(Debug, Clone)]
struct ActiveSound {
    track_id: String,
    generation: u64,
}

/// Single owner of the playback session, the sound cache and the
/// preference service.
pub struct PlayerService {
    session: PlaybackSession,
    preferences: PreferenceService,
    backend: Box<dyn AudioBackend>,
    source: Box<dyn MediaSource>,
    cache: SoundCache,
    audio_config: AudioConfig,
    active: Option<ActiveSound>,
    generation: u64,
    rng: StdRng,
}

impl fmt::Debug for PlayerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerService")
            .field("session", &self.session)
            .field("cache", &self.cache)
            .field("active", &self.active)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl PlayerService {
    pub fn new(
        preferences: PreferenceService,
        backend: Box<dyn AudioBackend>,
        source: Box<dyn MediaSource>,
    ) -> Self {
        Self {
            session: PlaybackSession::default(),
            preferences,
            backend,
            source,
            cache: SoundCache::new(SOUND_CACHE_CAPACITY),
            audio_config: AudioConfig::default(),
            active: None,
            generation: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a deterministic shuffle sequence.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn with_audio_config(mut self, audio_config: AudioConfig) -> Self {
        self.audio_config = audio_config;
        self
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn preferences(&self) -> &PreferenceService {
        &self.preferences
    }

    pub fn cache(&self) -> &SoundCache {
        &self.cache
    }

    /// Generation of the most recent `play_song` call.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> PlayerState {
        if self.session.is_loading {
            PlayerState::Loading
        } else if self.active.is_none() {
            PlayerState::Idle
        } else if self.session.is_playing {
            PlayerState::Playing
        } else {
            PlayerState::Paused
        }
    }

    /// Enumerate the media source, keep the playable tracks, rank them and
    /// preload the first one.
    /// Denied access leaves the track list untouched.
    pub fn load_songs(&mut self) {
        if !self.source.request_access() {
            info!("Media library access denied");
            return;
        }

        let assets = match self.source.enumerate(MAX_LIBRARY_ASSETS) {
            Ok(assets) => assets,
            Err(err) => {
                error!("Error loading songs: {err:#}");
                return;
            }
        };

        let total = assets.len();
        let songs: Vec<Track> = assets.into_iter().filter(library::is_playable).collect();
        info!("Loaded {} songs ({} too short)", songs.len(), total - songs.len());

        self.session.songs = songs;
        self.update_recommendations();

        if let Some(first) = self.session.songs.first().cloned() {
            self.preload(&first);
        }
    }

    /// Start `track` from the beginning.
    pub fn play_song(&mut self, track: &Track) {
        self.session.is_loading = true;
        self.preferences.update_play_count(&track.id);

        self.record_listened_time();
        self.cleanup();

        self.generation += 1;
        let generation = self.generation;

        if let Err(err) = self.start_playback(track, generation) {
            error!("Error playing song `{}': {err:#}", track.name);
            self.session.is_loading = false;
            self.cleanup();
            return;
        }

        info!("Now playing `{}' ({})", track.name, self.session.playback_mode);

        if let Some(next) = self.get_next_song() {
            self.preload(&next);
        }
        self.update_recommendations();
    }

    fn start_playback(&mut self, track: &Track, generation: u64) -> Result<()> {
        let volume = self.session.volume;
        let looping = self.session.playback_mode == PlaybackMode::LoopTrack;

        let cached = self.cache.contains(&track.id);
        if cached {
            debug!("Sound cache hit for `{}'", track.id);
        } else {
            let handle = self
                .backend
                .open(&track.uri, &self.audio_config, OpenOptions { should_play: true, volume })
                .with_context(|| format!("Failed to open {}", track.uri.display()))?;
            self.cache.insert(track.id.clone(), handle);
        }

        // Registered before any call on the handle: a failure below is torn
        // down by `cleanup`, which also drops the handle from the cache.
        self.active = Some(ActiveSound {
            track_id: track.id.clone(),
            generation,
        });

        let handle = self
            .cache
            .get_mut(&track.id)
            .context("Opened sound vanished from the cache")?;
        if cached {
            handle.seek(0)?;
            handle.set_volume(volume)?;
        }
        handle.set_looping(looping)?;
        handle.play()?;

        self.session.current_song = Some(track.clone());
        self.session.is_playing = true;
        self.session.is_loading = false;
        self.session.position_ms = 0;
        self.session.duration_ms = track.duration_millis();
        Ok(())
    }

    /// Open `track` paused and park it in the cache. Failures are logged.
    fn preload(&mut self, track: &Track) {
        if self.cache.contains(&track.id) {
            return;
        }

        match self.backend.open(&track.uri, &self.audio_config, OpenOptions::default()) {
            Ok(handle) => {
                debug!("Preloaded `{}'", track.id);
                if let Some(evicted) = self.cache.insert(track.id.clone(), handle) {
                    self.forget_if_active(&evicted);
                }
            }
            Err(err) => warn!("Error preloading `{}': {err:#}", track.name),
        }
    }

    /// The active handle was evicted: the session no longer has a sound.
    fn forget_if_active(&mut self, evicted: &str) {
        if self.active.as_ref().is_some_and(|a| a.track_id == evicted) {
            warn!("Active sound `{evicted}' was evicted from the cache");
            self.active = None;
            self.session.is_playing = false;
        }
    }

    pub fn pause_song(&mut self) {
        let Some(handle) = self.active_handle() else {
            return;
        };
        match handle.pause() {
            Ok(()) => self.session.is_playing = false,
            Err(err) => warn!("Error pausing: {err:#}"),
        }
    }

    pub fn resume_song(&mut self) {
        let Some(handle) = self.active_handle() else {
            return;
        };
        match handle.play() {
            Ok(()) => self.session.is_playing = true,
            Err(err) => warn!("Error resuming: {err:#}"),
        }
    }

    pub fn seek_to(&mut self, position_ms: u64) {
        let Some(handle) = self.active_handle() else {
            return;
        };
        match handle.seek(position_ms) {
            Ok(()) => self.session.position_ms = position_ms,
            Err(err) => warn!("Error seeking to {position_ms}ms: {err:#}"),
        }
    }

    /// Clamp `volume` to `[0, 1]` (NaN counts as 0) and apply it. The session
    /// volume is updated even without an active sound.
    pub fn set_volume(&mut self, volume: f32) {
        let clamped = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };

        if let Some(handle) = self.active_handle() {
            if let Err(err) = handle.set_volume(clamped) {
                warn!("Error setting volume: {err:#}");
            }
        }
        self.session.volume = clamped;
    }

    /// Advance to the next mode and mirror LoopTrack onto the active sound.
    pub fn cycle_playback_mode(&mut self) -> PlaybackMode {
        let mode = self.session.playback_mode.next();
        self.session.playback_mode = mode;

        if let Some(handle) = self.active_handle() {
            if let Err(err) = handle.set_looping(mode == PlaybackMode::LoopTrack) {
                warn!("Error toggling native looping: {err:#}");
            }
        }
        info!("Playback mode: {mode}");
        mode
    }

    pub fn get_next_song(&mut self) -> Option<Track> {
        self.neighbour(Direction::Forward)
    }

    pub fn get_previous_song(&mut self) -> Option<Track> {
        self.neighbour(Direction::Backward)
    }

    fn neighbour(&mut self, direction: Direction) -> Option<Track> {
        let current = self.session.current_song.as_ref()?;
        let songs = &self.session.songs;
        if songs.is_empty() {
            return None;
        }

        let len = songs.len();
        let current_index = songs.iter().position(|song| song.id == current.id);

        let index = if self.session.playback_mode == PlaybackMode::Shuffle {
            loop {
                let candidate = self.rng.gen_range(0..len);
                if len == 1 || Some(candidate) != current_index {
                    break candidate;
                }
            }
        } else {
            match (direction, current_index) {
                (Direction::Forward, Some(i)) => (i + 1) % len,
                (Direction::Forward, None) => 0,
                (Direction::Backward, Some(0) | None) => len - 1,
                (Direction::Backward, Some(i)) => i - 1,
            }
        };

        songs.get(index).cloned()
    }

    /// Leave the current track for the next one, counting a skip.
    pub fn play_next_song(&mut self) {
        let Some(next) = self.get_next_song() else {
            return;
        };
        if let Some(current) = &self.session.current_song {
            self.preferences.update_skip_count(&current.id);
        }
        self.play_song(&next);
    }

    pub fn play_previous_song(&mut self) {
        if let Some(previous) = self.get_previous_song() {
            self.play_song(&previous);
        }
    }

    /// Read the active sound's progress, if there is one.
    pub fn next_progress_update(&mut self) -> Option<ProgressUpdate> {
        let generation = self.active.as_ref()?.generation;
        let handle = self.active_handle()?;
        match handle.status() {
            Ok(status) => Some(ProgressUpdate { generation, status }),
            Err(err) => {
                warn!("Error reading playback status: {err:#}");
                None
            }
        }
    }

    /// Apply a progress report. Reports from a superseded generation are
    /// dropped.
    pub fn handle_progress(&mut self, update: ProgressUpdate) {
        if update.generation != self.generation || self.active.is_none() {
            debug!(
                "Dropping progress update from generation {} (current {})",
                update.generation, self.generation
            );
            return;
        }

        let status = update.status;
        if !status.is_loaded {
            return;
        }

        let known_duration = self
            .session
            .current_song
            .as_ref()
            .map_or(0, Track::duration_millis);
        self.session.position_ms = status.position_ms;
        self.session.duration_ms = status.duration_ms.unwrap_or(known_duration);

        if status.did_just_finish {
            self.on_finished();
        }
    }

    /// One progress tick: read and apply.
    pub fn poll(&mut self) {
        if let Some(update) = self.next_progress_update() {
            self.handle_progress(update);
        }
    }

    fn on_finished(&mut self) {
        let Some(current) = self.session.current_song.clone() else {
            return;
        };

        let listened = self.session.duration_ms.max(self.session.position_ms);
        self.preferences.update_play_duration(&current.id, listened);
        self.session.position_ms = 0;

        if self.session.playback_mode == PlaybackMode::LoopTrack {
            debug!("`{}' looped", current.name);
            self.preferences.update_repeat_count(&current.id);
            return;
        }
        self.play_next_song();
    }

    /// Credit the outgoing track with the time listened so far.
    fn record_listened_time(&mut self) {
        if self.active.is_none() || self.session.position_ms == 0 {
            return;
        }
        if let Some(current) = &self.session.current_song {
            self.preferences
                .update_play_duration(&current.id, self.session.position_ms);
        }
    }

    /// Stop and release the active sound. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if let Some(active) = self.active.take() {
            if let Some(mut handle) = self.cache.remove(&active.track_id) {
                if let Err(err) = handle.stop() {
                    warn!("Error stopping sound `{}': {err:#}", active.track_id);
                }
                if let Err(err) = handle.unload() {
                    warn!("Error unloading sound `{}': {err:#}", active.track_id);
                }
            }
        }
        self.session.is_playing = false;
    }

    fn update_recommendations(&mut self) {
        self.session.recommendations = self.preferences.get_recommendations(&self.session.songs);
    }

    fn active_handle(&mut self) -> Option<&mut Box<dyn AudioHandle>> {
        let id = self.active.as_ref()?.track_id.clone();
        self.cache.get_mut(&id)
    }
}

impl Drop for PlayerService {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{FakeBackend, SharedLog};
    use crate::db::MemoryStore;

    struct StaticSource {
        granted: bool,
        tracks: Vec<Track>,
    }

    impl MediaSource for StaticSource {
        fn request_access(&mut self) -> bool {
            self.granted
        }

        fn enumerate(&mut self, limit: usize) -> Result<Vec<Track>> {
            Ok(self.tracks.iter().take(limit).cloned().collect())
        }
    }

    fn track(id: &str, secs: f64) -> Track {
        Track::new(id, format!("/music/{id}.mp3"), id.to_uppercase(), secs)
    }

    fn uri(id: &str) -> String {
        format!("/music/{id}.mp3")
    }

    fn library(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| track(id, 120.0)).collect()
    }

    fn player_with(tracks: Vec<Track>, granted: bool) -> (PlayerService, SharedLog) {
        let (backend, log) = FakeBackend::new();
        let preferences = PreferenceService::new(Box::new(MemoryStore::new()));
        let source = StaticSource { granted, tracks };
        let mut player = PlayerService::new(preferences, Box::new(backend), Box::new(source)).with_seed(7);
        player.load_songs();
        (player, log)
    }

    fn player(ids: &[&str]) -> (PlayerService, SharedLog) {
        player_with(library(ids), true)
    }

    fn current_id(player: &PlayerService) -> Option<&str> {
        player.session().current_song.as_ref().map(|t| t.id.as_str())
    }

    fn finished(position_ms: u64) -> HandleStatus {
        HandleStatus {
            is_loaded: true,
            position_ms,
            duration_ms: Some(position_ms),
            did_just_finish: true,
        }
    }

    #[test]
    fn test_mode_cycle() {
        assert_eq!(PlaybackMode::Sequential.next(), PlaybackMode::Shuffle);
        assert_eq!(PlaybackMode::Shuffle.next(), PlaybackMode::LoopTrack);
        assert_eq!(PlaybackMode::LoopTrack.next(), PlaybackMode::Sequential);
        assert_eq!("loop-track".parse::<PlaybackMode>().unwrap(), PlaybackMode::LoopTrack);
        assert!("random".parse::<PlaybackMode>().is_err());
    }

    #[test]
    fn test_load_songs_filters_short_tracks_and_preloads_first() {
        let tracks = vec![track("a", 120.0), track("jingle", 29.9), track("b", 30.0)];
        let (player, log) = player_with(tracks, true);

        let ids: Vec<&str> = player.session().songs.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(player.session().recommendations.len(), 2);
        assert_eq!(log.borrow().open_count(&uri("a")), 1);
        assert!(player.cache().contains("a"));
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[test]
    fn test_denied_access_leaves_songs_untouched() {
        let (player, log) = player_with(library(&["a", "b"]), false);
        assert!(player.session().songs.is_empty());
        assert!(log.borrow().opened.is_empty());
    }

    #[test]
    fn test_play_song_uses_preloaded_handle() {
        let (mut player, log) = player(&["a", "b", "c"]);
        let a = player.session().songs[0].clone();

        player.play_song(&a);

        assert_eq!(current_id(&player), Some("a"));
        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(player.session().duration_ms, 120_000);
        assert_eq!(player.preferences().stats("a").unwrap().play_count, 1);
        assert_eq!(player.generation(), 1);

        let log = log.borrow();
        assert_eq!(log.open_count(&uri("a")), 1);
        assert!(log.seeks.contains(&(uri("a").into(), 0)));
        assert_eq!(log.looping.last(), Some(&(uri("a").into(), false)));
        // The sequential successor is preloaded.
        assert_eq!(log.open_count(&uri("b")), 1);
    }

    #[test]
    fn test_sequential_neighbours_wrap() {
        let (mut player, _log) = player(&["a", "b", "c"]);
        assert_eq!(player.get_next_song(), None);

        let c = player.session().songs[2].clone();
        player.play_song(&c);
        assert_eq!(player.get_next_song().unwrap().id, "a");
        assert_eq!(player.get_previous_song().unwrap().id, "b");

        let a = player.session().songs[0].clone();
        player.play_song(&a);
        assert_eq!(player.get_previous_song().unwrap().id, "c");
    }

    #[test]
    fn test_current_track_missing_from_list() {
        let (mut player, _log) = player(&["a", "b", "c"]);
        player.play_song(&track("elsewhere", 120.0));
        assert_eq!(player.get_next_song().unwrap().id, "a");
        assert_eq!(player.get_previous_song().unwrap().id, "c");
    }

    #[test]
    fn test_shuffle_never_repeats_current() {
        let (mut player, _log) = player(&["a", "b", "c", "d"]);
        let b = player.session().songs[1].clone();
        player.play_song(&b);
        player.cycle_playback_mode();
        assert_eq!(player.session().playback_mode, PlaybackMode::Shuffle);

        for _ in 0..100 {
            assert_ne!(player.get_next_song().unwrap().id, "b");
            assert_ne!(player.get_previous_song().unwrap().id, "b");
        }
    }

    #[test]
    fn test_shuffle_with_single_song_returns_it() {
        let (mut player, _log) = player(&["a"]);
        let a = player.session().songs[0].clone();
        player.play_song(&a);
        player.cycle_playback_mode();
        assert_eq!(player.get_next_song().unwrap().id, "a");
    }

    #[test]
    fn test_skip_is_counted_only_for_explicit_next() {
        let (mut player, _log) = player(&["a", "b", "c"]);
        let a = player.session().songs[0].clone();
        player.play_song(&a);

        player.play_next_song();
        assert_eq!(current_id(&player), Some("b"));
        assert_eq!(player.preferences().stats("a").unwrap().skip_count, 1);

        player.play_previous_song();
        assert_eq!(current_id(&player), Some("a"));
        assert_eq!(player.preferences().stats("b").unwrap().skip_count, 0);
        assert_eq!(player.preferences().stats("a").unwrap().play_count, 2);
    }

    #[test]
    fn test_natural_completion_advances_as_next() {
        let (mut player, log) = player(&["a", "b", "c"]);
        let a = player.session().songs[0].clone();
        player.play_song(&a);

        log.borrow_mut().statuses.push((uri("a").into(), finished(120_000)));
        player.poll();

        assert_eq!(current_id(&player), Some("b"));
        let stats = player.preferences().stats("a").unwrap();
        assert_eq!(stats.skip_count, 1);
        assert_eq!(stats.total_play_duration, 120_000);
        assert_eq!(player.generation(), 2);
    }

    #[test]
    fn test_loop_track_completion_counts_repeat() {
        let (mut player, log) = player(&["a", "b"]);
        player.cycle_playback_mode();
        player.cycle_playback_mode();
        let a = player.session().songs[0].clone();
        player.play_song(&a);
        assert_eq!(log.borrow().looping.last(), Some(&(uri("a").into(), true)));

        log.borrow_mut().statuses.push((uri("a").into(), finished(120_000)));
        player.poll();

        assert_eq!(current_id(&player), Some("a"));
        assert_eq!(player.generation(), 1);
        let stats = player.preferences().stats("a").unwrap();
        assert_eq!(stats.repeat_count, 1);
        assert_eq!(stats.play_count, 1);
        assert_eq!(player.session().position_ms, 0);
    }

    #[test]
    fn test_stale_progress_update_is_dropped() {
        let (mut player, log) = player(&["a", "b"]);
        let a = player.session().songs[0].clone();
        let b = player.session().songs[1].clone();
        player.play_song(&a);

        log.borrow_mut().statuses.push((
            uri("a").into(),
            HandleStatus {
                is_loaded: true,
                position_ms: 42_000,
                duration_ms: Some(120_000),
                did_just_finish: true,
            },
        ));
        let stale = player.next_progress_update().unwrap();
        assert_eq!(stale.generation, 1);

        player.play_song(&b);
        player.handle_progress(stale);

        assert_eq!(current_id(&player), Some("b"));
        assert_eq!(player.session().position_ms, 0);
        assert_eq!(player.preferences().stats("b").unwrap().play_count, 1);
    }

    #[test]
    fn test_listened_time_is_credited_when_switching() {
        let (mut player, log) = player(&["a", "b"]);
        let a = player.session().songs[0].clone();
        player.play_song(&a);

        log.borrow_mut().statuses.push((
            uri("a").into(),
            HandleStatus {
                is_loaded: true,
                position_ms: 15_000,
                duration_ms: Some(120_000),
                did_just_finish: false,
            },
        ));
        player.poll();
        assert_eq!(player.session().position_ms, 15_000);

        player.play_next_song();
        assert_eq!(player.preferences().stats("a").unwrap().total_play_duration, 15_000);
    }

    #[test]
    fn test_cleanup_releases_active_handle_once() {
        let (mut player, log) = player(&["a", "b"]);
        let a = player.session().songs[0].clone();
        player.play_song(&a);

        player.cleanup();
        player.cleanup();

        assert_eq!(log.borrow().unload_count(&uri("a")), 1);
        assert_eq!(log.borrow().stops.len(), 1);
        assert!(!player.cache().contains("a"));
        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(current_id(&player), Some("a"));
    }

    #[test]
    fn test_cache_stays_bounded_and_every_handle_is_released_once() {
        let ids = ["a", "b", "c", "d", "e"];
        let (mut player, log) = player(&ids);
        let songs = player.session().songs.clone();

        for song in songs.iter().chain(songs.iter()) {
            player.play_song(song);
            assert!(player.cache().len() <= SOUND_CACHE_CAPACITY);
        }
        drop(player);

        let log = log.borrow();
        for id in ids {
            assert_eq!(log.open_count(&uri(id)), log.unload_count(&uri(id)), "handle for {id}");
        }
    }

    #[test]
    fn test_open_failure_returns_to_idle() {
        let (mut player, log) = player(&["a", "b"]);
        log.borrow_mut().fail_open.insert(uri("b").into());
        let b = player.session().songs[1].clone();

        player.play_song(&b);

        assert_eq!(player.state(), PlayerState::Idle);
        assert!(!player.session().is_loading);
        assert!(!player.cache().contains("b"));
    }

    #[test]
    fn test_play_failure_releases_handle() {
        let (mut player, log) = player(&["a", "b"]);
        log.borrow_mut().fail_play.insert(uri("b").into());
        let b = player.session().songs[1].clone();

        player.play_song(&b);

        assert_eq!(player.state(), PlayerState::Idle);
        assert_eq!(log.borrow().unload_count(&uri("b")), 1);
        assert!(!player.cache().contains("b"));
    }

    #[test]
    fn test_failed_restart_of_cached_sound_is_released() {
        let (mut player, log) = player(&["a", "b"]);
        let a = player.session().songs[0].clone();
        assert!(player.cache().contains("a"));
        log.borrow_mut().fail_seek.insert(uri("a").into());

        player.play_song(&a);

        assert_eq!(player.state(), PlayerState::Idle);
        assert!(!player.cache().contains("a"));
        assert_eq!(log.borrow().unload_count(&uri("a")), 1);

        // The next attempt opens a fresh handle instead of reusing the dead one.
        log.borrow_mut().fail_seek.clear();
        player.play_song(&a);
        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(log.borrow().open_count(&uri("a")), 2);
    }

    #[test]
    fn test_volume_is_clamped() {
        let (mut player, log) = player(&["a"]);
        player.set_volume(1.7);
        assert_eq!(player.session().volume, 1.0);
        player.set_volume(-0.2);
        assert_eq!(player.session().volume, 0.0);
        player.set_volume(f32::NAN);
        assert_eq!(player.session().volume, 0.0);
        assert!(log.borrow().volumes.is_empty());

        let a = player.session().songs[0].clone();
        player.play_song(&a);
        player.set_volume(0.25);
        assert_eq!(log.borrow().volumes.last(), Some(&(uri("a").into(), 0.25)));
    }

    #[test]
    fn test_pause_resume_and_seek() {
        let (mut player, log) = player(&["a"]);
        player.pause_song();
        player.seek_to(5_000);
        assert!(log.borrow().pauses.is_empty());

        let a = player.session().songs[0].clone();
        player.play_song(&a);

        player.pause_song();
        assert_eq!(player.state(), PlayerState::Paused);
        player.seek_to(30_000);
        assert_eq!(player.session().position_ms, 30_000);
        player.resume_song();
        assert_eq!(player.state(), PlayerState::Playing);
    }

    #[test]
    fn test_cycling_into_loop_track_loops_active_sound() {
        let (mut player, log) = player(&["a", "b"]);
        let a = player.session().songs[0].clone();
        player.play_song(&a);

        player.cycle_playback_mode();
        assert_eq!(player.cycle_playback_mode(), PlaybackMode::LoopTrack);
        assert_eq!(log.borrow().looping.last(), Some(&(uri("a").into(), true)));

        player.cycle_playback_mode();
        assert_eq!(log.borrow().looping.last(), Some(&(uri("a").into(), false)));
    }
}
