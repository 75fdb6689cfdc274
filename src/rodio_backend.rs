//! Desktop audio backend built on `rodio`.
//!
//! Every handle owns its own `Sink` connected to the shared output mixer,
//! so a preloaded handle sits paused next to the one that is playing.
//! Looping is emulated by re-appending a fresh decoder once the sink runs
//! dry, which the handle notices on its next status poll.

use crate::audio::{AudioBackend, AudioHandle, HandleStatus, OpenOptions};
use crate::config::AudioConfig;
use anyhow::{Context, Result};
use log::debug;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend bound to the default output device.
pub struct RodioBackend {
    stream: OutputStream,
}

impl RodioBackend {
    /// Open the default output device.
    ///
    /// # Errors
    ///
    /// Fails when no output device is available.
    pub fn open_default() -> Result<Self> {
        let mut stream =
            OutputStreamBuilder::open_default_stream().context("No audio output device available")?;
        // rodio reports the stream drop on stderr; the CLI owns the terminal.
        stream.log_on_drop(false);
        Ok(Self { stream })
    }
}

type FileDecoder = Decoder<BufReader<File>>;

fn decode(uri: &Path) -> Result<FileDecoder> {
    let file = File::open(uri).with_context(|| format!("Failed to open {}", uri.display()))?;
    Decoder::new(BufReader::new(file)).with_context(|| format!("Failed to decode {}", uri.display()))
}

impl AudioBackend for RodioBackend {
    fn open(&mut self, uri: &Path, config: &AudioConfig, options: OpenOptions) -> Result<Box<dyn AudioHandle>> {
        let source = decode(uri)?;
        let duration = source.total_duration();

        debug!(
            "Opening {} (autoplay: {}, progress every {}ms, pitch correction: {})",
            uri.display(),
            options.should_play,
            config.progress_update_interval_ms,
            config.should_correct_pitch
        );

        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.set_volume(options.volume.clamp(0.0, 1.0));
        sink.append(source);
        if options.should_play {
            sink.play();
        }

        Ok(Box::new(RodioHandle {
            uri: uri.to_path_buf(),
            sink: Some(sink),
            duration,
            looping: false,
            stopped: false,
            finish_reported: false,
        }))
    }
}

struct RodioHandle {
    uri: PathBuf,
    sink: Option<Sink>,
    duration: Option<Duration>,
    looping: bool,
    stopped: bool,
    finish_reported: bool,
}

impl RodioHandle {
    fn sink(&self) -> Result<&Sink> {
        self.sink
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Sound for {} is already unloaded", self.uri.display()))
    }

    /// Queue the whole track again on the existing sink.
    fn rewind_source(&mut self) -> Result<()> {
        let source = decode(&self.uri)?;
        self.sink()?.append(source);
        self.stopped = false;
        self.finish_reported = false;
        Ok(())
    }

    fn status_at(&self, position: Duration, did_just_finish: bool) -> HandleStatus {
        HandleStatus {
            is_loaded: true,
            position_ms: position.as_millis() as u64,
            duration_ms: self.duration.map(|d| d.as_millis() as u64),
            did_just_finish,
        }
    }
}

impl AudioHandle for RodioHandle {
    fn play(&mut self) -> Result<()> {
        if self.stopped || self.sink()?.empty() {
            self.rewind_source()?;
        }
        self.sink()?.play();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.sink()?.pause();
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.sink()?.stop();
        self.stopped = true;
        Ok(())
    }

    fn unload(&mut self) -> Result<()> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| anyhow::anyhow!("Sound for {} is already unloaded", self.uri.display()))?;
        sink.stop();
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        if self.stopped || self.sink()?.empty() {
            self.rewind_source()?;
        }
        self.sink()?
            .try_seek(Duration::from_millis(position_ms))
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Failed to seek in {}", self.uri.display()))?;
        self.finish_reported = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.sink()?.set_volume(volume.clamp(0.0, 1.0));
        Ok(())
    }

    fn set_looping(&mut self, looping: bool) -> Result<()> {
        self.sink()?;
        self.looping = looping;
        Ok(())
    }

    fn status(&mut self) -> Result<HandleStatus> {
        let sink = self.sink()?;
        if self.stopped {
            return Ok(self.status_at(Duration::ZERO, false));
        }
        if !sink.empty() {
            return Ok(self.status_at(sink.get_pos(), false));
        }

        let end = self.duration.unwrap_or_default();
        if self.looping {
            self.rewind_source()?;
            self.sink()?.play();
            return Ok(self.status_at(end, true));
        }

        let first_report = !self.finish_reported;
        self.finish_reported = true;
        Ok(self.status_at(end, first_report))
    }
}
