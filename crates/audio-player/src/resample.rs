//! Whole-buffer resampling.
//!
//! Uses Rubato to convert a decoded interleaved `f32` track from its source rate
//! to the output device rate in one pass, chunk by chunk.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::decode::DecodedAudio;

/// Return `audio` converted to `dst_rate`.
///
/// Tracks already at `dst_rate` (or empty tracks) are returned unchanged.
pub fn resample_to(audio: DecodedAudio, dst_rate: u32, chunk_frames: usize) -> Result<DecodedAudio> {
    if audio.rate == dst_rate || audio.frames() == 0 || audio.rate == 0 {
        return Ok(audio);
    }

    let channels = audio.channels;
    let f_ratio = dst_rate as f64 / audio.rate as f64;

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let chunk_in_frames = chunk_frames.max(1);
    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init error: {e}"))?;

    let total_frames = audio.frames();
    let mut out = Vec::with_capacity((total_frames as f64 * f_ratio) as usize * channels + channels);
    let mut scratch = vec![0.0f32; channels * resampler.output_frames_max()];
    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    let mut pos = 0;
    while pos < total_frames {
        let frames = (total_frames - pos).min(chunk_in_frames);
        let input = &audio.samples[pos * channels..(pos + frames) * channels];

        let produced = {
            let input_adapter = InterleavedSlice::new(input, channels, frames)
                .map_err(|e| anyhow!("interleaved slice (input) error: {e}"))?;
            let out_capacity_frames = scratch.len() / channels;
            let mut output_adapter =
                InterleavedSlice::new_mut(&mut scratch, channels, out_capacity_frames)
                    .map_err(|e| anyhow!("interleaved slice (output) error: {e}"))?;

            indexing.partial_len = (frames < chunk_in_frames).then_some(frames);
            let (_nbr_in, nbr_out) = resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
                .map_err(|e| anyhow!("resampler process error: {e}"))?;
            nbr_out * channels
        };

        out.extend_from_slice(&scratch[..produced]);
        pos += frames;
    }

    tracing::info!(from_hz = audio.rate, to_hz = dst_rate, "audio resampled");

    Ok(DecodedAudio {
        rate: dst_rate,
        channels,
        samples: out,
        info: audio.info,
    })
}
