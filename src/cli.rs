//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `playwise` binary, plus the parser for
//! the line commands accepted during an interactive `play` session.
//!
//! ## Examples
//!
//! ```bash
//! playwise list --search blue --sort duration
//! playwise recommend --limit 10
//! playwise play "So What" --mode shuffle
//! ```

use crate::library::SortKey;
use crate::player::PlaybackMode;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Listing order accepted by `list --sort`.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum SortArg {
    #[default]
    Name,
    Duration,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortKey::Name,
            SortArg::Duration => SortKey::Duration,
        }
    }
}

/// Playback mode accepted by `play --mode`.
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum ModeArg {
    #[default]
    Sequential,
    Shuffle,
    LoopTrack,
}

impl From<ModeArg> for PlaybackMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Sequential => PlaybackMode::Sequential,
            ModeArg::Shuffle => PlaybackMode::Shuffle,
            ModeArg::LoopTrack => PlaybackMode::LoopTrack,
        }
    }
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "playwise")]
#[command(about = "Playwise: a local music player that learns what you like")]
#[command(version)]
pub struct Args {
    /// Music library root (defaults to the platform audio directory)
    #[arg(long, global = true, env = "PLAYWISE_MUSIC_DIR", value_hint = clap::ValueHint::DirPath)]
    pub music_dir: Option<PathBuf>,

    /// Preference database file
    #[arg(long, global = true, env = "PLAYWISE_DB", value_hint = clap::ValueHint::FilePath)]
    pub db: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List playable tracks in the library
    ///
    /// Tracks shorter than 30 seconds are left out.
    List {
        /// Only show tracks whose name contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Listing order
        #[arg(long, value_enum, default_value_t = SortArg::Name)]
        sort: SortArg,
    },

    /// Show tracks ranked by listening history
    Recommend {
        /// Number of tracks to show
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },

    /// Show stored per-track statistics
    Stats,

    /// Start an interactive playback session
    ///
    /// Type `help` once playing for the list of commands.
    Play {
        /// Track to start with (name search); defaults to the top recommendation
        #[arg(value_hint = clap::ValueHint::Other)]
        query: Option<String>,

        /// Initial playback mode
        #[arg(short, long, value_enum, default_value_t = ModeArg::Sequential)]
        mode: ModeArg,
    },

    /// Generate shell completions
    ///
    /// Usage: playwise completion bash > ~/.local/share/bash-completion/completions/playwise
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// A line typed during an interactive session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Pause,
    Resume,
    Toggle,
    Next,
    Previous,
    /// Target position in seconds.
    Seek(f64),
    Volume(f32),
    CycleMode,
    Status,
    Help,
    Quit,
}

pub const PLAYER_HELP: &str = "\
commands:
  pause | resume | toggle    control playback
  next | prev                change track
  seek <secs>                jump to a position
  vol <0..1>                 set volume
  mode                       cycle sequential / shuffle / loop_track
  status                     show the current track
  quit                       stop and exit";

/// Parse one interactive command line.
///
/// # Errors
///
/// Fails on unknown commands and on missing or malformed arguments.
pub fn parse_command(line: &str) -> Result<PlayerCommand> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        bail!("Empty command");
    };
    let arg = words.next();

    let command = match head.to_ascii_lowercase().as_str() {
        "pause" => PlayerCommand::Pause,
        "resume" | "play" => PlayerCommand::Resume,
        "toggle" | "p" => PlayerCommand::Toggle,
        "next" | "n" => PlayerCommand::Next,
        "prev" | "previous" | "b" => PlayerCommand::Previous,
        "seek" => {
            let secs: f64 = arg
                .context("Usage: seek <secs>")?
                .parse()
                .context("Seek position must be a number of seconds")?;
            if !secs.is_finite() || secs < 0.0 {
                bail!("Seek position must be zero or more seconds");
            }
            PlayerCommand::Seek(secs)
        }
        "vol" | "volume" => {
            let volume: f32 = arg
                .context("Usage: vol <0..1>")?
                .parse()
                .context("Volume must be a number between 0 and 1")?;
            PlayerCommand::Volume(volume)
        }
        "mode" | "m" => PlayerCommand::CycleMode,
        "status" | "s" => PlayerCommand::Status,
        "help" | "h" | "?" => PlayerCommand::Help,
        "quit" | "q" | "exit" => PlayerCommand::Quit,
        other => return Err(anyhow!("Unknown command: {other}. Type `help` for a list")),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_play_with_mode() {
        let args = Args::try_parse_from(["playwise", "play", "blue", "--mode", "loop-track"]).unwrap();
        match args.command {
            Command::Play { query, mode } => {
                assert_eq!(query.as_deref(), Some("blue"));
                assert_eq!(PlaybackMode::from(mode), PlaybackMode::LoopTrack);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_paths_after_subcommand() {
        let args = Args::try_parse_from(["playwise", "stats", "--db", "/tmp/p.db"]).unwrap();
        assert_eq!(args.db, Some(PathBuf::from("/tmp/p.db")));
    }

    #[test]
    fn test_parse_player_commands() {
        assert_eq!(parse_command("pause").unwrap(), PlayerCommand::Pause);
        assert_eq!(parse_command("  NEXT ").unwrap(), PlayerCommand::Next);
        assert_eq!(parse_command("seek 42.5").unwrap(), PlayerCommand::Seek(42.5));
        assert_eq!(parse_command("vol 0.3").unwrap(), PlayerCommand::Volume(0.3));
        assert_eq!(parse_command("q").unwrap(), PlayerCommand::Quit);
    }

    #[test]
    fn test_parse_player_command_errors() {
        assert!(parse_command("").is_err());
        assert!(parse_command("seek").is_err());
        assert!(parse_command("seek -3").is_err());
        assert!(parse_command("vol loud").is_err());
        assert!(parse_command("dance").is_err());
    }
}
