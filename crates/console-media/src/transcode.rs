//! External transcoder adapter.
//!
//! `ffprobe` reports stream metadata as JSON; `ffmpeg` exposes the video as a
//! pipe of fixed-size BMP images and the audio as one buffered MP3 stream.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::error::MediaError;
use crate::resolution::RenderResolution;

/// Container format of the bytes returned by [`Transcoder::decode_audio`].
pub const AUDIO_FORMAT: &str = "mp3";

/// Metadata of the first video stream of a source.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeInfo {
    /// Native frames per second, when the container reports one.
    pub frame_rate: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

impl ProbeInfo {
    /// Rough frame count at `fps`, for progress logging.
    pub fn estimated_frames(&self, fps: f64) -> Option<u64> {
        self.duration_seconds
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| (d * fps).round() as u64)
    }
}

/// Process boundary used by the renderers.
pub trait Transcoder: Send + Sync {
    fn probe(&self, path: &Path) -> Result<ProbeInfo>;

    /// Stream of concatenated 24-bit BMP images at `resolution`, one per frame.
    fn decode_video(
        &self,
        path: &Path,
        fps: f64,
        resolution: RenderResolution,
    ) -> Result<Box<dyn Read + Send>>;

    /// Whole audio track encoded as [`AUDIO_FORMAT`].
    fn decode_audio(&self, path: &Path) -> Result<Vec<u8>>;
}

/// [`Transcoder`] backed by the `ffmpeg` and `ffprobe` executables.
#[derive(Clone, Debug)]
pub struct Ffmpeg {
    ffmpeg: OsString,
    ffprobe: OsString,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<OsString>, ffprobe: impl Into<OsString>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn ffmpeg_command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(path)
            .stdin(Stdio::null());
        cmd
    }
}

impl Transcoder for Ffmpeg {
    fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries"])
            .arg("stream=codec_type,width,height,avg_frame_rate,r_frame_rate,duration:format=duration")
            .args(["-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn ffprobe for {}", path.display()))?;

        if !output.status.success() {
            bail!(
                "ffprobe failed for {} (exit status: {}): {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_probe(path, &output.stdout)
    }

    fn decode_video(
        &self,
        path: &Path,
        fps: f64,
        resolution: RenderResolution,
    ) -> Result<Box<dyn Read + Send>> {
        let mut cmd = self.ffmpeg_command(path);
        cmd.arg("-an")
            .arg("-r")
            .arg(format!("{fps}"))
            .arg("-s")
            .arg(format!("{}x{}", resolution.width, resolution.height))
            .args(["-pix_fmt", "bgr24", "-c:v", "bmp", "-f", "image2pipe", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        tracing::debug!(?cmd, "spawning video decoder");

        let stream = PipeStream::spawn(cmd).context("failed to spawn ffmpeg video decoder")?;
        Ok(Box::new(stream))
    }

    fn decode_audio(&self, path: &Path) -> Result<Vec<u8>> {
        let mut cmd = self.ffmpeg_command(path);
        cmd.args(["-vn", "-f", AUDIO_FORMAT, "-"]);
        let output = cmd
            .output()
            .with_context(|| format!("failed to spawn ffmpeg audio extraction for {}", path.display()))?;

        if !output.status.success() {
            return Err(MediaError::Transcoder(format!(
                "audio extraction exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .into());
        }
        if output.stdout.is_empty() {
            bail!("audio extraction produced no data for {}", path.display());
        }
        tracing::debug!(bytes = output.stdout.len(), "audio extracted");
        Ok(output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

fn parse_probe(path: &Path, json: &[u8]) -> Result<ProbeInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(json)
        .with_context(|| format!("failed to parse ffprobe JSON for {}", path.display()))?;

    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate));
    let duration_seconds = video.duration.as_deref().and_then(parse_seconds).or_else(|| {
        parsed
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(parse_seconds)
    });

    Ok(ProbeInfo {
        frame_rate,
        duration_seconds,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        has_audio,
    })
}

/// Parse an ffprobe rate such as `30000/1001` or `25`. Zero and
/// non-finite rates are treated as unknown.
fn parse_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let value = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

fn parse_seconds(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Stdout of a running child process.
///
/// Reports a failed exit status as a read error at end of stream, forwards the
/// child's stderr to the log, and kills the child when dropped early.
struct PipeStream {
    child: Child,
    stdout: ChildStdout,
    stderr_log: Option<JoinHandle<()>>,
    status: Option<ExitStatus>,
}

impl PipeStream {
    fn spawn(mut cmd: Command) -> Result<Self> {
        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;

        let stderr_log = match child.stderr.take() {
            Some(stderr) => Some(
                thread::Builder::new()
                    .name("console-media-ffmpeg-log".to_owned())
                    .spawn(move || {
                        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                            tracing::warn!(target: "ffmpeg", "{line}");
                        }
                    })
                    .context("failed to spawn ffmpeg log thread")?,
            ),
            None => None,
        };

        Ok(Self {
            child,
            stdout,
            stderr_log,
            status: None,
        })
    }

    fn reap(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait()?;
        self.status = Some(status);
        if let Some(handle) = self.stderr_log.take() {
            let _ = handle.join();
        }
        Ok(status)
    }
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            let status = self.reap()?;
            if !status.success() {
                return Err(io::Error::other(format!("ffmpeg exited with {status}")));
            }
        }
        Ok(n)
    }
}

impl Drop for PipeStream {
    fn drop(&mut self) {
        if self.status.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_json(json: &str) -> Result<ProbeInfo> {
        parse_probe(Path::new("clip.mp4"), json.as_bytes())
    }

    #[test]
    fn parses_video_and_audio_streams() {
        let info = probe_json(
            r#"{
                "programs": [],
                "streams": [
                    {"codec_type": "video", "width": 1920, "height": 1080,
                     "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001",
                     "duration": "12.5"},
                    {"codec_type": "audio", "avg_frame_rate": "0/0", "r_frame_rate": "0/0"}
                ],
                "format": {"duration": "12.6"}
            }"#,
        )
        .unwrap();

        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(info.duration_seconds, Some(12.5));
        assert!(info.has_audio);
        assert_eq!(info.estimated_frames(24.0), Some(300));
    }

    #[test]
    fn falls_back_to_container_duration_and_real_rate() {
        let info = probe_json(
            r#"{
                "streams": [
                    {"codec_type": "video", "width": 640, "height": 360,
                     "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}
                ],
                "format": {"duration": "4.000000"}
            }"#,
        )
        .unwrap();

        assert_eq!(info.frame_rate, Some(25.0));
        assert_eq!(info.duration_seconds, Some(4.0));
        assert!(!info.has_audio);
    }

    #[test]
    fn audio_only_source_has_no_video_stream() {
        let err = probe_json(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::NoVideoStream(_))
        ));
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(probe_json("not json").is_err());
    }

    #[test]
    fn rate_parsing() {
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate(" 24/1 "), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("n/a"), None);
        assert_eq!(parse_rate("0"), None);
    }

    #[test]
    fn unknown_duration_has_no_estimate() {
        let info = ProbeInfo {
            frame_rate: Some(24.0),
            duration_seconds: None,
            width: 1,
            height: 1,
            has_audio: false,
        };
        assert_eq!(info.estimated_frames(24.0), None);
    }

    #[cfg(unix)]
    #[test]
    fn pipe_stream_reports_failed_exit() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf abc; exit 3"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut stream = PipeStream::spawn(cmd).unwrap();

        let mut out = Vec::new();
        let err = stream.read_to_end(&mut out).unwrap_err();
        assert_eq!(out, b"abc");
        assert!(err.to_string().contains("exited"));
    }

    #[cfg(unix)]
    #[test]
    fn pipe_stream_reads_successful_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]).stdout(Stdio::piped());
        let mut stream = PipeStream::spawn(cmd).unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }
}
