//! Playback stage (CPAL output stream).
//!
//! The callback reads straight out of an immutable, fully decoded track using an
//! atomic frame cursor, so it never takes a lock. Once the cursor reaches the end
//! of the track the callback emits silence and raises the `finished` flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::decode::DecodedAudio;

/// Shared read position for a buffered track.
#[derive(Debug, Default)]
pub struct PlayCursor {
    frame: AtomicUsize,
    finished: AtomicBool,
}

impl PlayCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move back to frame zero and clear the finished flag.
    pub fn rewind(&self) {
        self.frame.store(0, Ordering::Release);
        self.finished.store(false, Ordering::Release);
    }

    pub fn position(&self) -> usize {
        self.frame.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Claim up to `want` frames from a track of `total` frames.
    ///
    /// Returns the start frame and the number of frames claimed. A concurrent
    /// [`rewind`](Self::rewind) wins: the claim is dropped and nothing is read.
    fn claim(&self, want: usize, total: usize) -> (usize, usize) {
        let start = self.frame.load(Ordering::Acquire);
        let take = total.saturating_sub(start).min(want);
        match self
            .frame
            .compare_exchange(start, start + take, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                if start + take >= total {
                    self.finished.store(true, Ordering::Release);
                }
                (start, take)
            }
            Err(_) => (0, 0),
        }
    }
}

/// Build a CPAL output stream that plays `track` from `cursor`.
///
/// `track` must already be at the device sample rate.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    track: Arc<DecodedAudio>,
    cursor: Arc<PlayCursor>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, track, cursor),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, track, cursor),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, track, cursor),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, track, cursor),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    track: Arc<DecodedAudio>,
    cursor: Arc<PlayCursor>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = (config.channels as usize).max(1);
    let total_frames = track.frames();
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;
            let (start, take) = cursor.claim(frames, total_frames);

            for frame in 0..take {
                for ch in 0..channels_out {
                    let sample = mapped_sample(
                        &track.samples,
                        track.channels,
                        start + frame,
                        channels_out,
                        ch,
                    );
                    data[frame * channels_out + ch] = <T as cpal::Sample>::from_sample::<f32>(sample);
                }
            }
            for slot in data.iter_mut().skip(take * channels_out) {
                *slot = <T as cpal::Sample>::from_sample::<f32>(0.0);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Read one output sample for `dst_ch` of source frame `frame`.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - matching layouts: pass-through
/// - other layouts: clamp to the last available source channel
fn mapped_sample(
    samples: &[f32],
    src_channels: usize,
    frame: usize,
    dst_channels: usize,
    dst_ch: usize,
) -> f32 {
    if src_channels == 0 {
        return 0.0;
    }
    let base = frame * src_channels;
    let get = |ch: usize| samples.get(base + ch).copied().unwrap_or(0.0);

    match (src_channels, dst_channels) {
        (2, 1) => 0.5 * (get(0) + get(1)),
        (1, _) => get(0),
        _ => get(dst_ch.min(src_channels - 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_advances_and_marks_finished() {
        let cursor = PlayCursor::new();
        assert_eq!(cursor.claim(4, 10), (0, 4));
        assert_eq!(cursor.claim(4, 10), (4, 4));
        assert!(!cursor.is_finished());
        assert_eq!(cursor.claim(4, 10), (8, 2));
        assert!(cursor.is_finished());
        assert_eq!(cursor.claim(4, 10), (10, 0));
    }

    #[test]
    fn rewind_restarts_from_zero() {
        let cursor = PlayCursor::new();
        cursor.claim(16, 8);
        assert!(cursor.is_finished());
        cursor.rewind();
        assert_eq!(cursor.position(), 0);
        assert!(!cursor.is_finished());
        assert_eq!(cursor.claim(3, 8), (0, 3));
    }

    #[test]
    fn empty_track_finishes_immediately() {
        let cursor = PlayCursor::new();
        assert_eq!(cursor.claim(64, 0), (0, 0));
        assert!(cursor.is_finished());
    }

    #[test]
    fn mapped_sample_handles_layouts() {
        let stereo = [0.2, 0.4, 0.6, 0.8];
        assert!((mapped_sample(&stereo, 2, 0, 1, 0) - 0.3).abs() < 1e-6);
        assert_eq!(mapped_sample(&stereo, 2, 1, 2, 1), 0.8);

        let mono = [0.5, -0.5];
        assert_eq!(mapped_sample(&mono, 1, 1, 2, 0), -0.5);
        assert_eq!(mapped_sample(&mono, 1, 1, 2, 1), -0.5);

        assert_eq!(mapped_sample(&stereo, 2, 0, 6, 5), 0.4);
        assert_eq!(mapped_sample(&stereo, 2, 9, 2, 0), 0.0);
    }
}
