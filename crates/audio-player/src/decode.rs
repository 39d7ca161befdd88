//! One-shot decode of a fully buffered audio stream.
//!
//! Uses Symphonia to:
//! - probe the in-memory container/codec
//! - decode every packet into interleaved `f32` samples
//!
//! The whole track is kept in memory so the sink can restart it from frame zero
//! as often as the caller asks without touching the source again.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Duration reported by the container, when known.
    pub duration_ms: Option<u64>,
}

/// Interleaved PCM for a whole track.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub rate: u32,
    pub channels: usize,
    pub samples: Vec<f32>,
    pub info: SourceInfo,
}

impl DecodedAudio {
    /// Number of interleaved frames in the track.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Playback length derived from the decoded sample count.
    pub fn duration_ms(&self) -> u64 {
        if self.rate == 0 {
            return 0;
        }
        (self.frames() as u64).saturating_mul(1000) / self.rate as u64
    }
}

/// Decode `bytes` completely.
///
/// `extension` is forwarded to the Symphonia probe as a format hint
/// (for example `"mp3"`). Corrupt packets are skipped; the first
/// non-recoverable reader error ends the track.
pub fn decode_buffered(bytes: Arc<[u8]>, extension: Option<&str>) -> Result<DecodedAudio> {
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();

    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();

    let info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        duration_ms: duration_ms_from_codec_params(&codec_params),
    };

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => {
                tracing::debug!("audio reader stopped: {e}");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("skipping corrupt audio packet: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    tracing::info!(
        rate_hz = rate,
        channels,
        codec = info.codec.as_deref().unwrap_or("unknown"),
        container_ms = ?info.duration_ms,
        samples = samples.len(),
        "audio decoded"
    );

    Ok(DecodedAudio {
        rate,
        channels,
        samples,
        info,
    })
}

/// Best-effort duration in milliseconds from codec metadata.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
