//! Frame production stage.
//!
//! Reads fixed-size BMP units from the transcoder's pixel stream, quantizes each
//! one to glyphs and appends it to the shared [`FrameBuffer`]. Runs on its own
//! thread so playback can start as soon as the first frame lands.

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::bitmap::{self, BitmapView};
use crate::cancel::CancelToken;
use crate::error::MediaError;
use crate::frame::Frame;
use crate::frame_buffer::FrameBuffer;
use crate::resolution::RenderResolution;

/// What the producer managed to do before the stream ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProduceSummary {
    pub frames: usize,
    /// Bytes of an incomplete trailing unit that were discarded.
    pub truncated_bytes: usize,
    pub cancelled: bool,
}

impl ProduceSummary {
    /// The short tail as an error value, for callers that want to surface it.
    pub fn truncation(&self) -> Option<MediaError> {
        (self.truncated_bytes > 0).then_some(MediaError::DecodeTruncated {
            dropped_bytes: self.truncated_bytes,
        })
    }
}

/// Joinable handle to a running producer thread.
pub struct ProducerHandle {
    join: JoinHandle<Result<ProduceSummary, MediaError>>,
}

impl ProducerHandle {
    pub fn join(self) -> Result<ProduceSummary, MediaError> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(MediaError::Transcoder("frame producer panicked".to_string())),
        }
    }
}

/// Start producing frames from `reader` on a background thread.
pub fn spawn_producer<R>(
    reader: R,
    resolution: RenderResolution,
    buffer: Arc<FrameBuffer>,
    cancel: CancelToken,
) -> Result<ProducerHandle, MediaError>
where
    R: Read + Send + 'static,
{
    let join = thread::Builder::new()
        .name("console-media-frames".to_owned())
        .spawn(move || {
            let mut reader = reader;
            produce(&mut reader, resolution, &buffer, &cancel)
        })?;
    Ok(ProducerHandle { join })
}

/// Drain `reader` into `buffer`, one frame per unit.
///
/// The buffer is always marked finished on return. A short tail is dropped and
/// reported in the summary; a unit that does not parse as a BMP of the expected
/// geometry stops production with [`MediaError::MalformedFrame`].
pub fn produce<R: Read>(
    reader: &mut R,
    resolution: RenderResolution,
    buffer: &FrameBuffer,
    cancel: &CancelToken,
) -> Result<ProduceSummary, MediaError> {
    let result = produce_units(reader, resolution, buffer, cancel);
    buffer.finish();

    match &result {
        Ok(summary) => {
            if let Some(err) = summary.truncation() {
                tracing::warn!("{err}");
            }
            tracing::info!(
                frames = summary.frames,
                cancelled = summary.cancelled,
                "frame production finished"
            );
        }
        Err(e) => tracing::error!(frames = buffer.len(), "frame production failed: {e}"),
    }
    result
}

fn produce_units<R: Read>(
    reader: &mut R,
    resolution: RenderResolution,
    buffer: &FrameBuffer,
    cancel: &CancelToken,
) -> Result<ProduceSummary, MediaError> {
    let unit_size = bitmap::bytes_per_frame(resolution);
    let mut unit = vec![0u8; unit_size];
    let mut summary = ProduceSummary::default();

    loop {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        let filled = read_unit(reader, &mut unit)?;
        if filled < unit_size {
            summary.truncated_bytes = filled;
            return Ok(summary);
        }

        let index = summary.frames;
        let view = BitmapView::parse(&unit)
            .map_err(|reason| MediaError::MalformedFrame { index, reason })?;
        if view.width() != resolution.width || view.height() != resolution.height {
            return Err(MediaError::MalformedFrame {
                index,
                reason: format!(
                    "geometry {}x{} does not match {}x{}",
                    view.width(),
                    view.height(),
                    resolution.width,
                    resolution.height
                ),
            });
        }

        buffer.push(Frame::glyphs_from_bitmap(&view));
        summary.frames += 1;
    }
}

/// Fill `unit` as far as the stream allows; returns the number of bytes read.
fn read_unit<R: Read>(reader: &mut R, unit: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < unit.len() {
        match reader.read(&mut unit[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
