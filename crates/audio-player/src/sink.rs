//! Restartable audio sinks.
//!
//! A sink is initialized once with a fully buffered, encoded audio stream and can
//! then be (re)started from position zero any number of times. Callers poll
//! [`AudioSink::state`] to learn when the track has run out.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use cpal::traits::StreamTrait;

use crate::config::PlaybackConfig;
use crate::decode;
use crate::device::OutputTarget;
use crate::playback::{self, PlayCursor};
use crate::resample;

/// Observable state of a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkState {
    Stopped,
    Playing,
}

/// Output that plays a fully buffered audio stream from the beginning on demand.
pub trait AudioSink {
    /// Decode and stage `stream` for playback. Replaces any previous stream.
    fn initialize(&mut self, stream: Arc<[u8]>) -> Result<()>;
    /// Start playback from position zero.
    fn play(&mut self) -> Result<()>;
    fn state(&self) -> SinkState;
    /// Halt output. Idempotent.
    fn stop(&mut self);
}

/// CPAL-backed sink.
///
/// The output stream is built and paused during [`initialize`](AudioSink::initialize),
/// so device errors surface there. Restarts only rewind the shared cursor.
pub struct CpalSink {
    host: cpal::Host,
    config: PlaybackConfig,
    format_hint: Option<String>,
    stream: Option<cpal::Stream>,
    cursor: Arc<PlayCursor>,
    started: bool,
}

impl CpalSink {
    /// Create a sink on the default host. `format_hint` is the container extension
    /// of the streams passed to `initialize` (for example `"mp3"`).
    pub fn new(config: PlaybackConfig, format_hint: Option<&str>) -> Self {
        Self {
            host: cpal::default_host(),
            config,
            format_hint: format_hint.map(str::to_string),
            stream: None,
            cursor: Arc::new(PlayCursor::new()),
            started: false,
        }
    }
}

impl AudioSink for CpalSink {
    fn initialize(&mut self, stream: Arc<[u8]>) -> Result<()> {
        self.stop();
        self.stream = None;

        let decoded = decode::decode_buffered(stream, self.format_hint.as_deref())
            .context("decode audio stream")?;
        let target = OutputTarget::open(&self.host, self.config.device.as_deref(), decoded.rate)?;
        let decoded = Arc::new(resample::resample_to(
            decoded,
            target.stream_config.sample_rate,
            self.config.chunk_frames,
        )?);

        self.cursor.rewind();
        let output = playback::build_output_stream(
            &target.device,
            &target.stream_config,
            target.sample_format,
            Arc::clone(&decoded),
            self.cursor.clone(),
        )
        .context("build output stream")?;
        // Some hosts start streams as soon as they are built.
        if let Err(e) = output.pause() {
            tracing::debug!("pause new output stream: {e}");
        }
        tracing::info!(duration_ms = decoded.duration_ms(), "audio sink initialized");

        self.stream = Some(output);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| anyhow!("audio sink played before initialize"))?;
        self.cursor.rewind();
        stream.play().context("start output stream")?;
        self.started = true;
        Ok(())
    }

    fn state(&self) -> SinkState {
        if self.started && !self.cursor.is_finished() {
            SinkState::Playing
        } else {
            SinkState::Stopped
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                tracing::warn!("pause output stream: {e}");
            }
        }
        self.started = false;
    }
}

/// Sink for sources without audio, or when output is muted.
///
/// Always reports [`SinkState::Stopped`], so a caller waiting for the track to end
/// proceeds immediately.
#[derive(Debug, Default)]
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn initialize(&mut self, _stream: Arc<[u8]>) -> Result<()> {
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        Ok(())
    }

    fn state(&self) -> SinkState {
        SinkState::Stopped
    }

    fn stop(&mut self) {}
}
