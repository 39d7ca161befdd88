//! Configuration loading and parsing.
//!
//! Settings come from three layers: built-in defaults, an optional TOML file and
//! command-line flags. Later layers win.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::scheduler::FPS_LIMIT;

pub const DEFAULT_VIDEO_HEIGHT: u32 = 250;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 600;
pub const DEFAULT_VIDEO_FONT_SIZE: u16 = 6;
pub const DEFAULT_IMAGE_FONT_SIZE: u16 = 2;

/// Optional settings file.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Desired video height in source pixel rows.
    pub video_height: Option<u32>,
    /// Desired image height in source pixel rows.
    pub image_height: Option<u32>,
    /// Override for the detected terminal height.
    pub max_rows: Option<u32>,
    pub fps_limit: Option<f64>,
    pub video_font_size: Option<u16>,
    pub image_font_size: Option<u16>,
    /// Output device name (substring match).
    pub device: Option<String>,
    pub mute: Option<bool>,
    /// Resize the terminal window to fit the grid.
    pub resize: Option<bool>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg =
            toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Values given on the command line. `None`/`false` means "not given".
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// Applies to whichever media kind is being played.
    pub height: Option<u32>,
    pub max_rows: Option<u32>,
    pub fps_limit: Option<f64>,
    pub device: Option<String>,
    pub mute: bool,
    pub no_resize: bool,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoOptions {
    pub height: u32,
    pub max_rows: Option<u32>,
    pub fps_limit: f64,
    pub font_size: u16,
    pub device: Option<String>,
    pub mute: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            height: DEFAULT_VIDEO_HEIGHT,
            max_rows: None,
            fps_limit: FPS_LIMIT,
            font_size: DEFAULT_VIDEO_FONT_SIZE,
            device: None,
            mute: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageOptions {
    pub height: u32,
    pub max_rows: Option<u32>,
    pub font_size: u16,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            height: DEFAULT_IMAGE_HEIGHT,
            max_rows: None,
            font_size: DEFAULT_IMAGE_FONT_SIZE,
        }
    }
}

/// Fully resolved settings.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub video: VideoOptions,
    pub image: ImageOptions,
    pub resize: bool,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Settings {
    /// Merge defaults, `file` and `cli`, then validate.
    pub fn resolve(file: &FileConfig, cli: &Overrides) -> Result<Self> {
        let max_rows = cli.max_rows.or(file.max_rows);
        let video = VideoOptions {
            height: cli.height.or(file.video_height).unwrap_or(DEFAULT_VIDEO_HEIGHT),
            max_rows,
            fps_limit: cli.fps_limit.or(file.fps_limit).unwrap_or(FPS_LIMIT),
            font_size: file.video_font_size.unwrap_or(DEFAULT_VIDEO_FONT_SIZE),
            device: cli.device.clone().or_else(|| file.device.clone()),
            mute: cli.mute || file.mute.unwrap_or(false),
        };
        let image = ImageOptions {
            height: cli.height.or(file.image_height).unwrap_or(DEFAULT_IMAGE_HEIGHT),
            max_rows,
            font_size: file.image_font_size.unwrap_or(DEFAULT_IMAGE_FONT_SIZE),
        };

        if !(video.fps_limit.is_finite() && video.fps_limit > 0.0) {
            bail!("fps limit must be a positive number, got {}", video.fps_limit);
        }
        if video.height == 0 || image.height == 0 {
            bail!("height must be at least 1");
        }
        if max_rows == Some(0) {
            bail!("max rows must be at least 1");
        }

        Ok(Self {
            video,
            image,
            resize: !cli.no_resize && file.resize.unwrap_or(true),
            ffmpeg: cli
                .ffmpeg
                .clone()
                .or_else(|| file.ffmpeg.clone())
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            ffprobe: cli
                .ffprobe
                .clone()
                .or_else(|| file.ffprobe.clone())
                .unwrap_or_else(|| PathBuf::from("ffprobe")),
        })
    }
}
