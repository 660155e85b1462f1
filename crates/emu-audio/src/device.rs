//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - enumerating output devices as `(name, id)` pairs, id 0 = system default
//! - resolving an id back to a device
//! - choosing the closest supported stream config for a requested format

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Display name plus numeric identifier; id 0 is reserved for the system
/// default device, ids 1..n follow the host's enumeration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceEntry {
    pub id: u32,
    pub name: String,
}

/// Enumerate output devices.
///
/// Always yields at least the "Default" entry, even when the host reports no
/// devices; selection then simply fails at open time.
pub fn query_devices(host: &cpal::Host) -> Vec<DeviceEntry> {
    let mut entries = vec![DeviceEntry {
        id: 0,
        name: "Default".to_string(),
    }];

    match host.output_devices() {
        Ok(devices) => {
            for (i, device) in devices.enumerate() {
                let id = i as u32 + 1;
                let name = device
                    .description()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|_| format!("Device {id}"));
                tracing::debug!(id, name = %name, "output device");
                entries.push(DeviceEntry { id, name });
            }
        }
        Err(e) => tracing::warn!("output device enumeration failed: {e}"),
    }

    entries
}

/// Clamp a requested device id to the enumerated range.
pub fn clamp_device_id(id: u32, entries: &[DeviceEntry]) -> u32 {
    id.min(entries.len().saturating_sub(1) as u32)
}

/// Resolve a (clamped) device id to a CPAL device.
pub fn pick_device(host: &cpal::Host, id: u32) -> Result<cpal::Device> {
    if id == 0 {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    }

    host.output_devices()
        .context("No output devices")?
        .nth(id as usize - 1)
        .ok_or_else(|| anyhow!("Output device {id} is no longer available"))
}

/// Choose the best supported output config for a requested rate and channel
/// count. Prefers an exact channel match, then a rate at or below the
/// target (closest first), then the friendliest sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
    channels: u16,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in ranges {
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            channel_match: range.channels() == channels,
            below_target: rate <= target_rate,
            rate_distance: target_rate.abs_diff(rate),
            format_rank: sample_format_rank(range.sample_format()),
        };
        let cfg = range.with_sample_rate(rate);
        let replace = match &best {
            None => true,
            Some((current, _)) => candidate.beats(current),
        };
        if replace {
            best = Some((candidate, cfg));
        }
    }

    Ok(best.unwrap().1)
}

/// Pick the stream buffer size closest to the requested fragment size.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    fragment_size: u32,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(fragment_size.clamp(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    channel_match: bool,
    below_target: bool,
    rate_distance: u32,
    format_rank: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.channel_match != other.channel_match {
            return self.channel_match;
        }
        if self.below_target != other.below_target {
            return self.below_target;
        }
        if self.rate_distance != other.rate_distance {
            return self.rate_distance < other.rate_distance;
        }
        self.format_rank < other.format_rank
    }
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max)
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
