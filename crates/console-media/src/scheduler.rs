//! Timed playback loop.
//!
//! `AwaitFirstFrame` blocks until the producer has published one frame. `Looping`
//! then repeats forever (until cancelled):
//! 1. restart the audio sink from position zero
//! 2. draw every frame published so far, re-reading the live length each step
//! 3. wait for the audio track to stop playing
//!
//! Frames are paced against a deadline that advances by one interval per frame,
//! so sleep overshoot does not accumulate over a loop. When a frame misses its
//! deadline it is counted as late and the deadline restarts from now.
//!
//! If the audio sink fails to start, playback continues silently.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use audio_player::sink::{AudioSink, SinkState};

use crate::cancel::CancelToken;
use crate::error::MediaError;
use crate::frame::Frame;
use crate::frame_buffer::{FrameBuffer, WaitOutcome};

/// Upper bound on the playback rate, to bound terminal redraw cost.
pub const FPS_LIMIT: f64 = 24.0;

const AUDIO_POLL: Duration = Duration::from_millis(5);

/// Destination for rendered frames.
pub trait FrameSink {
    /// Called once before the first frame is drawn.
    fn prepare(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Overwrite the whole grid starting at the top-left origin.
    fn draw(&mut self, frame: &Frame) -> io::Result<()>;
}

/// Counters describing a playback run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Completed passes over the buffer.
    pub loop_index: u64,
    pub frames_drawn: u64,
    /// Frames drawn after their interval had already elapsed.
    pub late_frames: u64,
}

/// Effective rate: the source rate capped at `limit`. Unknown or non-positive
/// source rates fall back to `limit`.
pub fn effective_fps(native: f64, limit: f64) -> f64 {
    if native.is_finite() && native > 0.0 {
        native.min(limit)
    } else {
        limit
    }
}

/// Target time between frames.
pub fn frame_interval(fps: f64) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(f64::EPSILON))
}

pub struct PlaybackScheduler<'a, S: FrameSink, A: AudioSink + ?Sized> {
    buffer: Arc<FrameBuffer>,
    sink: &'a mut S,
    audio: &'a mut A,
    interval: Duration,
    cancel: CancelToken,
}

impl<'a, S: FrameSink, A: AudioSink + ?Sized> PlaybackScheduler<'a, S, A> {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        sink: &'a mut S,
        audio: &'a mut A,
        fps: f64,
        cancel: CancelToken,
    ) -> Self {
        Self {
            buffer,
            sink,
            audio,
            interval: frame_interval(fps),
            cancel,
        }
    }

    /// Play until cancelled.
    ///
    /// Returns [`MediaError::NoFrames`] if the producer finishes without
    /// publishing anything.
    pub fn run(mut self) -> Result<PlaybackSummary> {
        let mut state = PlaybackSummary::default();

        match self.buffer.wait_for_len(1, &self.cancel) {
            WaitOutcome::Ready => {}
            WaitOutcome::Cancelled => return Ok(state),
            WaitOutcome::Exhausted => return Err(MediaError::NoFrames.into()),
        }
        tracing::debug!(interval_ms = self.interval.as_secs_f64() * 1000.0, "playback started");

        self.sink.prepare().context("prepare terminal")?;
        let result = self.looping(&mut state);
        self.audio.stop();
        result.map(|()| state)
    }

    fn looping(&mut self, state: &mut PlaybackSummary) -> Result<()> {
        let mut audio_ok = true;
        while !self.cancel.is_cancelled() {
            if audio_ok {
                if let Err(e) = self.audio.play() {
                    tracing::warn!("restart audio failed, continuing without sound: {e:#}");
                    self.audio.stop();
                    audio_ok = false;
                }
            }

            let mut deadline = Instant::now() + self.interval;
            let mut i = 0;
            while i < self.buffer.len() {
                if self.cancel.is_cancelled() {
                    return Ok(());
                }
                let Some(frame) = self.buffer.get(i) else {
                    break;
                };
                self.sink.draw(&frame).context("draw frame")?;
                state.frames_drawn += 1;

                let now = Instant::now();
                if now < deadline {
                    thread::sleep(deadline - now);
                    deadline += self.interval;
                } else {
                    state.late_frames += 1;
                    deadline = now + self.interval;
                }
                i += 1;
            }

            if audio_ok && !self.wait_for_audio_end() {
                return Ok(());
            }
            state.loop_index += 1;
            tracing::debug!(loop_index = state.loop_index, frames = i, "playback loop finished");
        }
        Ok(())
    }

    /// Returns `false` when cancelled while waiting.
    fn wait_for_audio_end(&self) -> bool {
        while self.audio.state() == SinkState::Playing {
            if self.cancel.is_cancelled() {
                return false;
            }
            thread::sleep(AUDIO_POLL);
        }
        !self.cancel.is_cancelled()
    }
}
