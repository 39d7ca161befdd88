//! Error taxonomy for loading and playing media.

use std::path::PathBuf;

/// Failures surfaced by the rendering engine.
///
/// Construction-time variants (`SourceNotFound`, `NoVideoStream`, `DegenerateSource`)
/// abort startup. Playback-time variants are reported through the producer and
/// extraction handles instead of being dropped.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("file {0} does not exist")]
    SourceNotFound(PathBuf),

    #[error("no video stream found in {0}")]
    NoVideoStream(PathBuf),

    #[error("source has degenerate dimensions {width}x{height}")]
    DegenerateSource { width: u32, height: u32 },

    #[error("pixel stream ended {dropped_bytes} bytes into an incomplete frame")]
    DecodeTruncated { dropped_bytes: usize },

    #[error("malformed frame {index}: {reason}")]
    MalformedFrame { index: usize, reason: String },

    #[error("decoder produced no frames")]
    NoFrames,

    #[error("transcoder failed: {0}")]
    Transcoder(String),

    #[error("audio initialization failed: {0}")]
    AudioInit(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
