//! # Playwise
//!
//! Command-line front end for the playwise core: library listing,
//! recommendations, stored statistics and an interactive playback session
//! on the default audio output.
//!
//! ## Usage
//!
//! ```bash
//! playwise list --sort duration
//! playwise recommend
//! playwise play --mode shuffle
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};
use playwise::cli::{self, PlayerCommand};
use playwise::completion;
use playwise::config::{RuntimeConfig, MAX_LIBRARY_ASSETS, RECOMMENDATION_PREVIEW_LEN};
use playwise::db::SqliteStore;
use playwise::library::{self, format_time, DirectorySource, MediaSource};
use playwise::player::{PlaybackMode, PlayerService, PlayerState};
use playwise::preferences::PreferenceService;
use playwise::rodio_backend::RodioBackend;
use playwise::track::Track;
use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug playwise play` - Enable debug logging
/// - `RUST_LOG=playwise::player=trace playwise play` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    if let cli::Command::Completion { shell } = args.command {
        completion::print_completions(shell);
        return Ok(());
    }

    let config = RuntimeConfig::with_paths(args.db, args.music_dir)?;
    debug!("Using database {} and library {}", config.db_path.display(), config.music_dir.display());

    match args.command {
        cli::Command::List { search, sort } => list_tracks(&config, search.as_deref(), sort.into())?,
        cli::Command::Recommend { limit } => recommend(&config, limit)?,
        cli::Command::Stats => show_stats(&config)?,
        cli::Command::Play { query, mode } => run_session(&config, query.as_deref(), mode.into())?,
        cli::Command::Completion { .. } => {}
    }

    Ok(())
}

fn open_preferences(config: &RuntimeConfig) -> Result<PreferenceService> {
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("Failed to open preference store {}", config.db_path.display()))?;
    Ok(PreferenceService::new(Box::new(store)))
}

/// Playable tracks of the configured library, in enumeration order.
fn load_library(config: &RuntimeConfig) -> Result<Vec<Track>> {
    let mut source = DirectorySource::new(&config.music_dir);
    if !source.request_access() {
        bail!("Cannot read music directory {}", config.music_dir.display());
    }
    let tracks = source.enumerate(MAX_LIBRARY_ASSETS)?;
    Ok(tracks.into_iter().filter(library::is_playable).collect())
}

fn list_tracks(config: &RuntimeConfig, search: Option<&str>, sort: library::SortKey) -> Result<()> {
    let tracks = load_library(config)?;
    let mut listing = library::search_tracks(&tracks, search.unwrap_or_default());
    library::sort_tracks(&mut listing, sort);

    if listing.is_empty() {
        println!("No tracks found.");
        return Ok(());
    }

    for track in &listing {
        println!("{:>6}  {}", format_time(track.duration_millis()), track.name);
    }
    println!("\n{} of {} tracks", listing.len(), tracks.len());
    Ok(())
}

fn recommend(config: &RuntimeConfig, limit: usize) -> Result<()> {
    let tracks = load_library(config)?;
    let preferences = open_preferences(config)?;

    for (rank, track) in preferences.get_recommendations(&tracks).iter().take(limit).enumerate() {
        let plays = preferences.stats(&track.id).map_or(0, |stats| stats.play_count);
        println!("{:>3}. {}  ({}, {} plays)", rank + 1, track.name, format_time(track.duration_millis()), plays);
    }
    Ok(())
}

fn show_stats(config: &RuntimeConfig) -> Result<()> {
    let preferences = open_preferences(config)?;
    let mut entries: Vec<_> = preferences.all_stats().iter().collect();
    if entries.is_empty() {
        println!("No listening history yet.");
        return Ok(());
    }
    entries.sort_by(|a, b| b.1.play_count.cmp(&a.1.play_count).then_with(|| a.0.cmp(b.0)));

    println!("{:>5} {:>5} {:>7} {:>8}  track", "plays", "skips", "repeats", "avg");
    for (id, stats) in entries {
        println!(
            "{:>5} {:>5} {:>7} {:>8}  {}",
            stats.play_count,
            stats.skip_count,
            stats.repeat_count,
            format_time(stats.average_play_duration as u64),
            id
        );
    }
    Ok(())
}

/// Interactive session. A reader thread forwards stdin lines; the main
/// thread owns the player and polls progress between commands.
fn run_session(config: &RuntimeConfig, query: Option<&str>, mode: PlaybackMode) -> Result<()> {
    let preferences = open_preferences(config)?;
    let backend = RodioBackend::open_default()?;
    let mut player = PlayerService::new(
        preferences,
        Box::new(backend),
        Box::new(DirectorySource::new(&config.music_dir)),
    )
    .with_audio_config(config.audio);

    player.load_songs();
    if player.session().songs.is_empty() {
        bail!("No playable tracks in {}", config.music_dir.display());
    }
    while player.session().playback_mode != mode {
        player.cycle_playback_mode();
    }

    let first = match query {
        Some(query) => library::search_tracks(&player.session().songs, query)
            .first()
            .map(|track| (*track).clone())
            .with_context(|| format!("No track matching `{query}'"))?,
        None => player
            .session()
            .recommendations
            .first()
            .cloned()
            .context("No recommendations available")?,
    };

    print_up_next(&player);
    player.play_song(&first);
    print_status(&player);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let tick = Duration::from_millis(config.audio.progress_update_interval_ms);
    let mut announced = player.session().current_song.as_ref().map(|t| t.id.clone());

    loop {
        match rx.recv_timeout(tick) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match cli::parse_command(&line) {
                Ok(PlayerCommand::Quit) => break,
                Ok(command) => apply_command(&mut player, command),
                Err(err) => eprintln!("{err:#}"),
            },
            Err(RecvTimeoutError::Timeout) => player.poll(),
            Err(RecvTimeoutError::Disconnected) => {
                info!("Input closed, stopping playback");
                break;
            }
        }

        let current = player.session().current_song.as_ref().map(|t| t.id.clone());
        if current != announced {
            print_status(&player);
            announced = current;
        }
    }

    player.cleanup();
    Ok(())
}

fn apply_command(player: &mut PlayerService, command: PlayerCommand) {
    match command {
        PlayerCommand::Pause => player.pause_song(),
        PlayerCommand::Resume => player.resume_song(),
        PlayerCommand::Toggle => {
            if player.session().is_playing {
                player.pause_song();
            } else {
                player.resume_song();
            }
        }
        PlayerCommand::Next => player.play_next_song(),
        PlayerCommand::Previous => player.play_previous_song(),
        PlayerCommand::Seek(secs) => player.seek_to((secs * 1000.0) as u64),
        PlayerCommand::Volume(volume) => {
            player.set_volume(volume);
            println!("volume {:.0}%", player.session().volume * 100.0);
        }
        PlayerCommand::CycleMode => println!("mode: {}", player.cycle_playback_mode()),
        PlayerCommand::Status => print_status(player),
        PlayerCommand::Help => println!("{}", cli::PLAYER_HELP),
        PlayerCommand::Quit => {}
    }
}

fn print_status(player: &PlayerService) {
    let session = player.session();
    let Some(track) = &session.current_song else {
        println!("[stopped]");
        return;
    };
    let marker = match player.state() {
        PlayerState::Playing => ">",
        PlayerState::Paused => "||",
        PlayerState::Loading => "...",
        PlayerState::Idle => "[]",
    };
    println!(
        "{marker} {}  {} / {}  [{}]",
        track.name,
        format_time(session.position_ms),
        format_time(session.duration_ms),
        session.playback_mode
    );
}

fn print_up_next(player: &PlayerService) {
    let recommended = &player.session().recommendations;
    if recommended.is_empty() {
        return;
    }
    println!("Recommended:");
    for track in recommended.iter().take(RECOMMENDATION_PREVIEW_LEN) {
        println!("  {}  ({})", track.name, format_time(track.duration_millis()));
    }
}
