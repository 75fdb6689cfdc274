//! Local music player core that learns from listening habits.
//!
//! Core modules:
//! - [`preferences`] - Per-track statistics and recommendations
//! - [`algorithm`] - Track scoring
//! - [`player`] - Playback session, navigation and progress handling
//! - [`cache`] - Bounded cache of opened sounds
//!
//! ### Supporting Modules
//!
//! - [`track`] - Track descriptor
//! - [`db`] - Key-value persistence (SQLite and in-memory)
//! - [`audio`] - Audio backend traits, with [`rodio_backend`] for desktop output
//! - [`library`] - Media sources, search and sort helpers
//! - [`config`] - Constants, audio session settings and data paths
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use playwise::db::SqliteStore;
//! use playwise::library::DirectorySource;
//! use playwise::player::PlayerService;
//! use playwise::preferences::PreferenceService;
//! use playwise::rodio_backend::RodioBackend;
//! use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = playwise::config::RuntimeConfig::new()?;
//! let preferences = PreferenceService::new(Box::new(SqliteStore::open(&config.db_path)?));
//!
//! let mut player = PlayerService::new(
//!     preferences,
//!     Box::new(RodioBackend::open_default()?),
//!     Box::new(DirectorySource::new(&config.music_dir)),
//! );
//! player.load_songs();
//!
//! if let Some(top) = player.session().recommendations.first().cloned() {
//!     player.play_song(&top);
//! }
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod audio;
pub mod cache;
pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod library;
pub mod player;
pub mod preferences;
pub mod rodio_backend;
pub mod track;
