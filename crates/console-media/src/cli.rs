use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::config::Overrides;

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CONSOLE_MEDIA_GIT_SHA"),
    ", ",
    env!("CONSOLE_MEDIA_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "console-media", version = VERSION, arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List audio output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Settings file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Desired height in source pixel rows (two rows per text line)
    #[arg(long, global = true)]
    pub height: Option<u32>,

    /// Treat the terminal as this many rows tall instead of querying it
    #[arg(long, global = true)]
    pub max_rows: Option<u32>,

    /// Upper bound on the playback frame rate
    #[arg(long, global = true)]
    pub fps_limit: Option<f64>,

    /// Use a specific audio output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Play video without sound
    #[arg(long, global = true)]
    pub mute: bool,

    /// Leave the terminal window size alone
    #[arg(long, global = true)]
    pub no_resize: bool,

    /// ffmpeg executable
    #[arg(long, global = true)]
    pub ffmpeg: Option<PathBuf>,

    /// ffprobe executable
    #[arg(long, global = true)]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a video file in a loop, with sound
    Video {
        /// Path to the video (prompted for when omitted)
        path: Option<PathBuf>,
    },

    /// Show a still image in color
    Image {
        /// Path to the image (prompted for when omitted)
        path: Option<PathBuf>,
    },
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            height: self.height,
            max_rows: self.max_rows,
            fps_limit: self.fps_limit,
            device: self.device.clone(),
            mute: self.mute,
            no_resize: self.no_resize,
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
        }
    }
}

/// Ask for a path on `output` and read one line from `input`.
pub fn prompt_path(prompt: &str, mut input: impl BufRead, mut output: impl Write) -> Result<PathBuf> {
    writeln!(output, "{prompt}").context("write prompt")?;
    output.flush().context("flush prompt")?;

    let mut line = String::new();
    if input.read_line(&mut line).context("read path")? == 0 {
        bail!("no path given");
    }
    let path = clean_path_input(&line);
    if path.as_os_str().is_empty() {
        bail!("no path given");
    }
    Ok(path)
}

/// Strip the quotes file managers add when a path is dragged into a terminal.
pub fn clean_path_input(raw: &str) -> PathBuf {
    PathBuf::from(raw.replace('"', "").trim())
}
