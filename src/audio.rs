//! Audio subsystem seam.
//!
//! The player never touches an output device directly. It opens handles
//! through an [`AudioBackend`] and drives them through [`AudioHandle`].
//! [`crate::rodio_backend`] provides the desktop implementation.

use crate::config::AudioConfig;
use anyhow::Result;
use std::path::Path;

/// Options for a single `open` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenOptions {
    /// Start playing as soon as the data is loaded.
    pub should_play: bool,
    /// Initial volume in `[0, 1]`.
    pub volume: f32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            should_play: false,
            volume: 1.0,
        }
    }
}

/// Snapshot reported by a handle on every progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleStatus {
    /// Whether the handle still holds decoded data.
    pub is_loaded: bool,
    pub position_ms: u64,
    /// Total length when the decoder knows it.
    pub duration_ms: Option<u64>,
    /// True exactly once per completed pass through the track.
    pub did_just_finish: bool,
}

/// An opened track.
pub trait AudioHandle {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Release the underlying resource. The handle is unusable afterwards.
    fn unload(&mut self) -> Result<()>;
    fn seek(&mut self, position_ms: u64) -> Result<()>;
    fn set_volume(&mut self, volume: f32) -> Result<()>;
    /// With looping on, the handle restarts itself at the end of the track
    /// and still reports `did_just_finish` for each completed cycle.
    fn set_looping(&mut self, looping: bool) -> Result<()>;
    /// Current progress. Called every progress interval by the player.
    fn status(&mut self) -> Result<HandleStatus>;
}

/// Factory for [`AudioHandle`]s.
pub trait AudioBackend {
    /// Open the audio at `uri`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or decoded, or the output device
    /// rejects it.
    fn open(&mut self, uri: &Path, config: &AudioConfig, options: OpenOptions) -> Result<Box<dyn AudioHandle>>;
}
