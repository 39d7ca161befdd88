//! Console Media: play videos and show images as text glyphs in a terminal.
//!
//! ## Pipeline
//! 1. **Plan**: probe the source and fit a glyph grid to the terminal ([`resolution`]).
//! 2. **Produce**: a background thread reads BMP frames from `ffmpeg` and quantizes
//!    them to glyphs ([`producer`], [`quantize`]) into an append-only [`frame_buffer`].
//! 3. **Play**: the main thread draws frames at a fixed rate, restarting the audio
//!    track on every loop ([`scheduler`]).
//!
//! Images skip the pipeline: they are decoded in process, mapped to the 16-color
//! [`palette`] and drawn once.

pub mod bitmap;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_buffer;
pub mod palette;
pub mod producer;
pub mod quantize;
pub mod renderer;
pub mod resolution;
pub mod scheduler;
pub mod terminal;
pub mod transcode;

pub use cancel::CancelToken;
pub use error::MediaError;
pub use renderer::{ImageRenderer, MediaRenderer, VideoRenderer};
