//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - resolving the device/config pair a sink should open for a given source rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Device plus the negotiated stream configuration.
pub struct OutputTarget {
    pub device: cpal::Device,
    pub sample_format: cpal::SampleFormat,
    pub stream_config: cpal::StreamConfig,
}

impl OutputTarget {
    /// Resolve a device by optional name and pick the config closest to `source_rate`.
    pub fn open(host: &cpal::Host, needle: Option<&str>, source_rate: u32) -> Result<Self> {
        let device = pick_device(host, needle)?;
        let supported = pick_output_config(&device, source_rate)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }
        tracing::info!(
            device = %device.description()?,
            source_rate_hz = source_rate,
            output_rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            "audio output config"
        );
        Ok(Self {
            device,
            sample_format: supported.sample_format(),
            stream_config,
        })
    }
}

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the supported config whose rate is nearest to `source_rate`, preferring
/// exact matches (no resampling) and float sample formats.
fn pick_output_config(
    device: &cpal::Device,
    source_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), source_rate);
        let distance = rate.abs_diff(source_rate);
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_distance, b_rank, _)) => (distance, rank) < (*b_distance, *b_rank),
        };
        if replace {
            best = Some((distance, rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Prefer a fixed buffer size if the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 4_096;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
