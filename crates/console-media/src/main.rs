use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use console_media::cli::{self, Args, Command};
use console_media::config::{FileConfig, Settings};
use console_media::terminal::{self, TerminalSession};
use console_media::transcode::Ffmpeg;
use console_media::{CancelToken, ImageRenderer, MediaRenderer, VideoRenderer};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let mut args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("warn,console_media=info,audio_player=info")
        }))
        .init();

    if args.list_devices {
        audio_player::device::list_devices(&cpal::default_host())?;
        return Ok(());
    }
    let Some(cmd) = args.cmd.take() else {
        Args::command().print_help()?;
        return Ok(());
    };

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&file, &args.overrides())?;

    let rows = terminal::terminal_rows();
    let mut renderer: Box<dyn MediaRenderer> = match cmd {
        Command::Video { path } => {
            let path = resolve_path(path, "Enter the path of a video:")?;
            let transcoder = Arc::new(Ffmpeg::new(&settings.ffmpeg, &settings.ffprobe));
            Box::new(VideoRenderer::open(&path, settings.video.clone(), rows, transcoder)?)
        }
        Command::Image { path } => {
            let path = resolve_path(path, "Enter the path of an image:")?;
            Box::new(ImageRenderer::open(&path, settings.image.clone(), rows)?)
        }
    };

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || on_signal.cancel()).context("install ctrl-c handler")?;

    let session = TerminalSession::enter(renderer.resolution(), renderer.font_size(), settings.resize)?;
    let result = renderer.play(&cancel);
    drop(session);
    result
}

fn resolve_path(given: Option<PathBuf>, prompt: &str) -> Result<PathBuf> {
    match given {
        Some(path) => Ok(path),
        None => cli::prompt_path(prompt, io::stdin().lock(), io::stdout()),
    }
}
