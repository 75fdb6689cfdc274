//! Track records as enumerated from the media source.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A playable audio asset.
///
/// Tracks are never created by the player itself; they come from a
/// [`MediaSource`](crate::library::MediaSource) and are immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier. Statistics are keyed by it across sessions.
    pub id: String,
    /// Location of the audio data.
    pub uri: PathBuf,
    /// Name shown to the user.
    pub name: String,
    /// Length in seconds.
    pub duration_secs: f64,
    /// Optional cover art image.
    pub artwork: Option<PathBuf>,
}

impl Track {
    pub fn new(id: impl Into<String>, uri: impl Into<PathBuf>, name: impl Into<String>, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            name: name.into(),
            duration_secs,
            artwork: None,
        }
    }

    #[must_use]
    pub fn with_artwork(mut self, artwork: impl Into<PathBuf>) -> Self {
        self.artwork = Some(artwork.into());
        self
    }

    /// Duration in whole milliseconds. Negative or non-finite durations count as zero.
    #[must_use]
    pub fn duration_millis(&self) -> u64 {
        if self.duration_secs.is_finite() && self.duration_secs > 0.0 {
            (self.duration_secs * 1000.0).round() as u64
        } else {
            0
        }
    }
}
