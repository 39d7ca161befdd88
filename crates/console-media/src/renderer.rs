//! Media renderers.
//!
//! A renderer is built once per source: construction validates the file, probes
//! it and plans the grid; [`MediaRenderer::play`] then drives the terminal until
//! the cancel token fires.

use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use audio_player::config::PlaybackConfig;
use audio_player::sink::{AudioSink, CpalSink, SilentSink};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use image::imageops::FilterType;

use crate::cancel::CancelToken;
use crate::config::{ImageOptions, VideoOptions};
use crate::error::MediaError;
use crate::frame::Frame;
use crate::frame_buffer::FrameBuffer;
use crate::palette::Rgb;
use crate::producer;
use crate::resolution::{self, RenderResolution};
use crate::scheduler::{self, FrameSink, PlaybackScheduler, PlaybackSummary};
use crate::terminal::TerminalSink;
use crate::transcode::{self, Transcoder};

const AUDIO_WAIT_SLICE: Duration = Duration::from_millis(50);
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Something that can be shown in the terminal.
pub trait MediaRenderer {
    /// Suggested terminal font size for this kind of media.
    fn font_size(&self) -> u16;
    fn resolution(&self) -> RenderResolution;
    /// Render to stdout until `cancel` fires.
    fn play(&mut self, cancel: &CancelToken) -> Result<()>;
}

/// A validated file together with the grid it will be drawn on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSource {
    pub path: PathBuf,
    pub resolution: RenderResolution,
}

/// Fail with [`MediaError::SourceNotFound`] unless `path` is an existing file.
pub fn ensure_exists(path: &Path) -> Result<PathBuf, MediaError> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(MediaError::SourceNotFound(path.to_path_buf()))
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), MediaError> {
    if width == 0 || height == 0 {
        return Err(MediaError::DegenerateSource { width, height });
    }
    Ok(())
}

pub struct VideoRenderer {
    source: MediaSource,
    fps: f64,
    has_audio: bool,
    options: VideoOptions,
    transcoder: Arc<dyn Transcoder>,
}

impl VideoRenderer {
    /// Probe `path` and plan playback. `terminal_rows` is used unless the options
    /// pin `max_rows`.
    pub fn open(
        path: &Path,
        options: VideoOptions,
        terminal_rows: u32,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self> {
        let path = ensure_exists(path)?;
        let info = transcoder.probe(&path)?;
        check_dimensions(info.width, info.height)?;

        let fps = scheduler::effective_fps(info.frame_rate.unwrap_or(0.0), options.fps_limit);
        let resolution = resolution::plan(
            info.width,
            info.height,
            options.height,
            options.max_rows.unwrap_or(terminal_rows),
        );
        tracing::info!(
            path = %path.display(),
            source_width = info.width,
            source_height = info.height,
            width = resolution.width,
            height = resolution.height,
            fps,
            frames = ?info.estimated_frames(fps),
            has_audio = info.has_audio,
            "video opened"
        );

        Ok(Self {
            source: MediaSource { path, resolution },
            fps,
            has_audio: info.has_audio,
            options,
            transcoder,
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    /// Play into `sink`. With `audio` set and an audio track present, the track
    /// is extracted in the background and restarted on every loop; any failure
    /// on that path falls back to silent playback.
    pub fn run_with<S: FrameSink>(
        &self,
        sink: &mut S,
        audio: Option<&mut dyn AudioSink>,
        cancel: &CancelToken,
    ) -> Result<PlaybackSummary> {
        let resolution = self.source.resolution;
        let reader = self
            .transcoder
            .decode_video(&self.source.path, self.fps, resolution)?;

        let buffer = FrameBuffer::shared();
        let producer_cancel = CancelToken::new();
        let producer =
            producer::spawn_producer(reader, resolution, buffer.clone(), producer_cancel.clone())?;

        let extraction = match audio {
            Some(out) if self.has_audio => Some((out, self.spawn_audio_extraction()?)),
            _ => None,
        };

        let mut silent = SilentSink;
        let mut audio_sink: &mut dyn AudioSink = &mut silent;
        if let Some((out, (rx, handle))) = extraction {
            match receive_audio(&rx, cancel) {
                Some(result) => {
                    if handle.join().is_err() {
                        tracing::warn!("audio extraction thread panicked");
                    }
                    match result.and_then(|bytes| out.initialize(Arc::from(bytes))) {
                        Ok(()) => audio_sink = out,
                        Err(e) => {
                            let err = MediaError::AudioInit(format!("{e:#}"));
                            tracing::warn!("{err}; playing without sound");
                        }
                    }
                }
                // The extraction thread is detached and finishes on its own.
                None => tracing::debug!("cancelled while extracting audio"),
            }
        }

        let played =
            PlaybackScheduler::new(buffer, sink, audio_sink, self.fps, cancel.clone()).run();
        producer_cancel.cancel();
        let produced = producer.join();

        match (played, produced) {
            (Ok(summary), Ok(_)) => {
                tracing::info!(
                    loops = summary.loop_index,
                    frames = summary.frames_drawn,
                    late = summary.late_frames,
                    "playback stopped"
                );
                Ok(summary)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e),
            (Err(play), Err(produce)) => {
                tracing::debug!("playback failed after producer error: {play:#}");
                Err(produce.into())
            }
        }
    }

    fn spawn_audio_extraction(&self) -> Result<(Receiver<Result<Vec<u8>>>, JoinHandle<()>)> {
        let (tx, rx) = bounded(1);
        let transcoder = self.transcoder.clone();
        let path = self.source.path.clone();
        let handle = thread::Builder::new()
            .name("console-media-audio".to_owned())
            .spawn(move || {
                let _ = tx.send(transcoder.decode_audio(&path));
            })
            .context("spawn audio extraction thread")?;
        Ok((rx, handle))
    }
}

/// Wait for the extracted audio; `None` when cancelled first.
fn receive_audio(
    rx: &Receiver<Result<Vec<u8>>>,
    cancel: &CancelToken,
) -> Option<Result<Vec<u8>>> {
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        match rx.recv_timeout(AUDIO_WAIT_SLICE) {
            Ok(result) => return Some(result),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Some(Err(anyhow!("audio extraction ended without a result")));
            }
        }
    }
}

impl MediaRenderer for VideoRenderer {
    fn font_size(&self) -> u16 {
        self.options.font_size
    }

    fn resolution(&self) -> RenderResolution {
        self.source.resolution
    }

    fn play(&mut self, cancel: &CancelToken) -> Result<()> {
        let mut sink = TerminalSink::new(BufWriter::new(io::stdout()));
        if self.options.mute {
            self.run_with(&mut sink, None, cancel)?;
        } else {
            let config = PlaybackConfig {
                device: self.options.device.clone(),
                ..PlaybackConfig::default()
            };
            let mut audio = CpalSink::new(config, Some(transcode::AUDIO_FORMAT));
            self.run_with(&mut sink, Some(&mut audio), cancel)?;
        }
        Ok(())
    }
}

/// Still image drawn once with palette colors.
pub struct ImageRenderer {
    source: MediaSource,
    frame: Frame,
    options: ImageOptions,
}

impl ImageRenderer {
    pub fn open(path: &Path, options: ImageOptions, terminal_rows: u32) -> Result<Self> {
        let path = ensure_exists(path)?;
        let decoded = image::ImageReader::open(&path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("failed to read image {}", path.display()))?
            .decode()
            .with_context(|| format!("failed to decode image {}", path.display()))?;
        check_dimensions(decoded.width(), decoded.height())?;

        let resolution = resolution::plan(
            decoded.width(),
            decoded.height(),
            options.height,
            options.max_rows.unwrap_or(terminal_rows),
        );
        let pixels = decoded
            .resize_exact(resolution.width, resolution.height, FilterType::Triangle)
            .to_rgb8();
        let frame = Frame::colored_from_fn(resolution.width, resolution.height, |x, y| {
            let [r, g, b] = pixels.get_pixel(x, y).0;
            Rgb::new(r, g, b)
        });
        tracing::info!(
            path = %path.display(),
            width = resolution.width,
            height = resolution.height,
            "image opened"
        );

        Ok(Self {
            source: MediaSource { path, resolution },
            frame,
            options,
        })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    /// Draw the image once, then idle until cancelled.
    pub fn run_with<S: FrameSink>(&self, sink: &mut S, cancel: &CancelToken) -> Result<()> {
        sink.prepare().context("prepare terminal")?;
        sink.draw(&self.frame).context("draw image")?;
        cancel.wait(IDLE_POLL);
        Ok(())
    }
}

impl MediaRenderer for ImageRenderer {
    fn font_size(&self) -> u16 {
        self.options.font_size
    }

    fn resolution(&self) -> RenderResolution {
        self.source.resolution
    }

    fn play(&mut self, cancel: &CancelToken) -> Result<()> {
        let mut sink = TerminalSink::new(BufWriter::new(io::stdout()));
        self.run_with(&mut sink, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap;
    use crate::palette::ConsoleColor;
    use crate::transcode::ProbeInfo;
    use audio_player::sink::SinkState;
    use std::io::{Cursor, Read};

    struct FakeTranscoder {
        info: ProbeInfo,
        video: Vec<u8>,
        audio: std::result::Result<Vec<u8>, String>,
    }

    impl Transcoder for FakeTranscoder {
        fn probe(&self, _path: &Path) -> Result<ProbeInfo> {
            Ok(self.info.clone())
        }

        fn decode_video(
            &self,
            _path: &Path,
            _fps: f64,
            _resolution: RenderResolution,
        ) -> Result<Box<dyn Read + Send>> {
            Ok(Box::new(Cursor::new(self.video.clone())))
        }

        fn decode_audio(&self, _path: &Path) -> Result<Vec<u8>> {
            self.audio.clone().map_err(|e| anyhow!(e))
        }
    }

    #[derive(Default)]
    struct RecordingAudio {
        initialized: Option<Vec<u8>>,
        plays: usize,
        fail_init: bool,
        fail_play: bool,
    }

    impl AudioSink for RecordingAudio {
        fn initialize(&mut self, stream: Arc<[u8]>) -> Result<()> {
            if self.fail_init {
                return Err(anyhow!("no output device"));
            }
            self.initialized = Some(stream.to_vec());
            Ok(())
        }

        fn play(&mut self) -> Result<()> {
            self.plays += 1;
            if self.fail_play {
                return Err(anyhow!("output stream lost"));
            }
            Ok(())
        }

        fn state(&self) -> SinkState {
            SinkState::Stopped
        }

        fn stop(&mut self) {}
    }

    struct CountingSink {
        frames: Vec<Frame>,
        limit: usize,
        cancel: CancelToken,
    }

    impl CountingSink {
        fn new(limit: usize, cancel: &CancelToken) -> Self {
            Self {
                frames: Vec::new(),
                limit,
                cancel: cancel.clone(),
            }
        }
    }

    impl FrameSink for CountingSink {
        fn draw(&mut self, frame: &Frame) -> io::Result<()> {
            self.frames.push(frame.clone());
            if self.frames.len() >= self.limit {
                self.cancel.cancel();
            }
            Ok(())
        }
    }

    fn source_file() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    /// 4x2 source planned at height 2 gives a 4x1 grid.
    fn small_options() -> VideoOptions {
        VideoOptions {
            height: 2,
            fps_limit: 200.0,
            ..VideoOptions::default()
        }
    }

    fn small_transcoder(units: usize, audio: std::result::Result<Vec<u8>, String>) -> FakeTranscoder {
        let mut video = Vec::new();
        for i in 0..units {
            let shade = (i * 100).min(255) as u8;
            video.extend(bitmap::encode(4, 1, &[Rgb::new(shade, shade, shade); 4]));
        }
        FakeTranscoder {
            info: ProbeInfo {
                frame_rate: Some(30.0),
                duration_seconds: Some(0.1),
                width: 4,
                height: 2,
                has_audio: true,
            },
            video,
            audio,
        }
    }

    #[test]
    fn missing_file_is_rejected_before_probing() {
        let dir = tempfile::tempdir().unwrap();
        let err = VideoRenderer::open(
            &dir.path().join("missing.mp4"),
            VideoOptions::default(),
            60,
            Arc::new(small_transcoder(0, Ok(Vec::new()))),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::SourceNotFound(_))
        ));
    }

    #[test]
    fn zero_sized_source_is_degenerate() {
        let file = source_file();
        let mut fake = small_transcoder(0, Ok(Vec::new()));
        fake.info.width = 0;
        let err = VideoRenderer::open(file.path(), VideoOptions::default(), 60, Arc::new(fake))
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::DegenerateSource { width: 0, height: 2 })
        ));
    }

    #[test]
    fn open_caps_fps_and_plans_the_grid() {
        let file = source_file();
        let mut fake = small_transcoder(0, Ok(Vec::new()));
        fake.info.width = 1920;
        fake.info.height = 1080;
        fake.info.frame_rate = Some(60.0);

        let renderer =
            VideoRenderer::open(file.path(), VideoOptions::default(), 60, Arc::new(fake)).unwrap();
        assert_eq!(renderer.fps(), 24.0);
        assert_eq!(renderer.resolution(), RenderResolution { width: 206, height: 58 });
        assert_eq!(renderer.font_size(), 6);
    }

    #[test]
    fn plays_frames_with_extracted_audio() {
        let file = source_file();
        let renderer = VideoRenderer::open(
            file.path(),
            small_options(),
            60,
            Arc::new(small_transcoder(3, Ok(b"ID3 fake".to_vec()))),
        )
        .unwrap();
        assert_eq!(renderer.resolution(), RenderResolution { width: 4, height: 1 });

        let cancel = CancelToken::new();
        let mut sink = CountingSink::new(5, &cancel);
        let mut audio = RecordingAudio::default();
        let summary = renderer
            .run_with(&mut sink, Some(&mut audio), &cancel)
            .unwrap();

        assert_eq!(summary.frames_drawn, 5);
        assert_eq!(sink.frames[0], Frame::Glyphs { rows: vec!["████".into()] });
        assert_eq!(sink.frames[3], sink.frames[0]);
        assert_eq!(audio.initialized.as_deref(), Some(&b"ID3 fake"[..]));
        assert_eq!(audio.plays, 2);
    }

    #[test]
    fn audio_failure_falls_back_to_silence() {
        let file = source_file();
        let renderer = VideoRenderer::open(
            file.path(),
            small_options(),
            60,
            Arc::new(small_transcoder(2, Err("no audio stream".into()))),
        )
        .unwrap();

        let cancel = CancelToken::new();
        let mut sink = CountingSink::new(2, &cancel);
        let mut audio = RecordingAudio::default();
        renderer
            .run_with(&mut sink, Some(&mut audio), &cancel)
            .unwrap();

        assert_eq!(sink.frames.len(), 2);
        assert!(audio.initialized.is_none());
        assert_eq!(audio.plays, 0);
    }

    #[test]
    fn device_failure_falls_back_to_silence() {
        let file = source_file();
        let renderer = VideoRenderer::open(
            file.path(),
            small_options(),
            60,
            Arc::new(small_transcoder(2, Ok(b"ID3".to_vec()))),
        )
        .unwrap();

        let cancel = CancelToken::new();
        let mut sink = CountingSink::new(2, &cancel);
        let mut audio = RecordingAudio {
            fail_init: true,
            ..RecordingAudio::default()
        };
        renderer
            .run_with(&mut sink, Some(&mut audio), &cancel)
            .unwrap();
        assert_eq!(audio.plays, 0);
    }

    #[test]
    fn failed_audio_start_still_draws_frames() {
        let file = source_file();
        let renderer = VideoRenderer::open(
            file.path(),
            small_options(),
            60,
            Arc::new(small_transcoder(2, Ok(b"ID3".to_vec()))),
        )
        .unwrap();

        let cancel = CancelToken::new();
        let mut sink = CountingSink::new(5, &cancel);
        let mut audio = RecordingAudio {
            fail_play: true,
            ..RecordingAudio::default()
        };
        let summary = renderer
            .run_with(&mut sink, Some(&mut audio), &cancel)
            .unwrap();

        assert_eq!(sink.frames.len(), 5);
        assert_eq!(summary.frames_drawn, 5);
        assert_eq!(audio.initialized.as_deref(), Some(&b"ID3"[..]));
        assert_eq!(audio.plays, 1);
    }

    #[test]
    fn producer_error_is_surfaced() {
        let file = source_file();
        let mut fake = small_transcoder(1, Ok(Vec::new()));
        fake.video[0] = b'X';
        fake.info.has_audio = false;
        let renderer =
            VideoRenderer::open(file.path(), small_options(), 60, Arc::new(fake)).unwrap();

        let cancel = CancelToken::new();
        let mut sink = CountingSink::new(1, &cancel);
        let err = renderer.run_with(&mut sink, None, &cancel).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::MalformedFrame { index: 0, .. })
        ));
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn empty_video_reports_no_frames() {
        let file = source_file();
        let mut fake = small_transcoder(0, Ok(Vec::new()));
        fake.info.has_audio = false;
        let renderer =
            VideoRenderer::open(file.path(), small_options(), 60, Arc::new(fake)).unwrap();

        let cancel = CancelToken::new();
        let mut sink = CountingSink::new(1, &cancel);
        let err = renderer.run_with(&mut sink, None, &cancel).unwrap_err();
        assert!(matches!(err.downcast_ref::<MediaError>(), Some(MediaError::NoFrames)));
    }

    #[test]
    fn image_is_quantized_to_palette_colors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("split.png");
        let img = image::RgbImage::from_fn(8, 4, |x, _| {
            if x < 4 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        img.save(&path).unwrap();

        let options = ImageOptions {
            height: 4,
            ..ImageOptions::default()
        };
        let renderer = ImageRenderer::open(&path, options, 60).unwrap();
        assert_eq!(renderer.resolution(), RenderResolution { width: 8, height: 2 });
        assert_eq!(renderer.font_size(), 2);

        let row = renderer.frame().color_row(0).unwrap();
        assert_eq!(row[0], ConsoleColor::Red);
        assert_eq!(row[7], ConsoleColor::Blue);

        let cancel = CancelToken::new();
        let mut sink = CountingSink::new(1, &cancel);
        renderer.run_with(&mut sink, &cancel).unwrap();
        assert_eq!(sink.frames.len(), 1);
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(ImageRenderer::open(&path, ImageOptions::default(), 60).is_err());
    }
}
