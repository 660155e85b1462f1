//! Overlay playback: short notification buffers mixed on an independent
//! hardware stream.
//!
//! The mixer owns all of its state, so independent instances can coexist
//! (per window, per test). The stream opens lazily on first use and fills
//! its buffer with silence before additively mixing the loaded audio, so an
//! exhausted overlay simply goes quiet instead of looping or clicking.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use cpal::traits::StreamTrait;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::device;
use crate::stream::{RenderFn, build_output_stream};

/// Secondary playback path for short fixed buffers (notification sounds).
pub struct OverlayMixer {
    path: Option<PathBuf>,
    shared: Arc<Mutex<OverlayShared>>,
    stream: Option<cpal::Stream>,
    device_id: u32,
    source_rate: u32,
    stream_rate: u32,
    speed: f64,
}

/// State shared with the overlay callback.
struct OverlayShared {
    /// Decoded interleaved samples; replaced wholesale on a new load.
    buffer: Vec<f32>,
    /// Source channel count.
    channels: usize,
    /// Fractional read position in source frames.
    cursor: f64,
    /// Exclusive end of the playback window, in samples.
    end: usize,
    /// Source frames consumed per output frame (rate ratio × speed).
    step: f64,
    /// Volume factor applied while mixing; zero while primary audio is
    /// disabled.
    volume: f32,
}

impl OverlayMixer {
    pub fn new() -> Self {
        Self {
            path: None,
            shared: Arc::new(Mutex::new(OverlayShared {
                buffer: Vec::new(),
                channels: 1,
                cursor: 0.0,
                end: 0,
                step: 1.0,
                volume: 1.0,
            })),
            stream: None,
            device_id: 0,
            source_rate: 0,
            stream_rate: 0,
            speed: 1.0,
        }
    }

    /// Route overlay output to the given device id on the next stream open.
    pub fn set_device(&mut self, device_id: u32) {
        self.device_id = device_id;
    }

    /// Volume factor for subsequent mixing, clamped to [0, 1].
    pub fn set_volume_factor(&self, factor: f32) {
        self.shared.lock().unwrap().volume = factor.clamp(0.0, 1.0);
    }

    /// Playback speed scale; 1.0 plays at the recorded rate. Changing the
    /// speed rescales the remaining playback duration accordingly.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        self.update_step();
    }

    /// Start playing `[offset, offset + length)` samples of `path`.
    ///
    /// The file is decoded on first use or path change; a decode failure
    /// leaves any previously loaded overlay untouched. A zero `length`
    /// plays to the end of the buffer. Fails when `offset` lies beyond the
    /// buffer.
    pub fn play(&mut self, path: &Path, offset: usize, length: usize) -> Result<()> {
        let loaded = !self.shared.lock().unwrap().buffer.is_empty();
        if self.path.as_deref() != Some(path) || !loaded {
            let (samples, rate, channels) = decode_buffer(path)?;
            let mut st = self.shared.lock().unwrap();
            st.buffer = samples;
            st.channels = channels;
            st.cursor = 0.0;
            st.end = 0;
            drop(st);
            self.source_rate = rate;
            self.path = Some(path.to_path_buf());
            self.update_step();
        }

        {
            let mut st = self.shared.lock().unwrap();
            let total = st.buffer.len();
            let (start, len) = playback_window(total, offset, length)
                .ok_or_else(|| anyhow!("overlay offset {offset} beyond buffer length {total}"))?;
            st.cursor = (start / st.channels) as f64;
            st.end = start + len;
        }

        if self.stream.is_none() {
            self.open_stream()?;
        }
        Ok(())
    }

    /// Remaining samples in the current playback window.
    pub fn current_len(&self) -> usize {
        let st = self.shared.lock().unwrap();
        let consumed = (st.cursor.floor() as usize) * st.channels;
        st.end.saturating_sub(consumed)
    }

    /// Release the buffer and close the overlay stream. No-op when already
    /// stopped.
    pub fn stop(&mut self) {
        self.stream = None;
        self.path = None;
        let mut st = self.shared.lock().unwrap();
        st.buffer = Vec::new();
        st.cursor = 0.0;
        st.end = 0;
    }

    /// Pause or resume the overlay stream alongside the primary device.
    pub fn pause(&self, state: bool) {
        if let Some(stream) = &self.stream {
            let result = if state {
                stream.pause().map_err(|e| e.to_string())
            } else {
                stream.play().map_err(|e| e.to_string())
            };
            if let Err(e) = result {
                tracing::warn!("overlay stream pause/resume failed: {e}");
            }
        }
    }

    /// Resume playback unconditionally; used after a mute toggle so an
    /// in-flight overlay keeps going.
    pub fn resume(&self) {
        self.pause(false);
    }

    fn update_step(&mut self) {
        if self.source_rate == 0 || self.stream_rate == 0 {
            return;
        }
        let ratio = f64::from(self.source_rate) / f64::from(self.stream_rate);
        self.shared.lock().unwrap().step = ratio * self.speed;
    }

    fn open_stream(&mut self) -> Result<()> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.device_id)?;

        let channels = self.shared.lock().unwrap().channels as u16;
        let supported = device::pick_output_config(&device, self.source_rate, channels)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported, 1024) {
            stream_config.buffer_size = buf;
        }
        self.stream_rate = stream_config.sample_rate;
        self.update_step();

        let dst_channels = stream_config.channels as usize;
        let shared = self.shared.clone();
        let render: RenderFn = Box::new(move |out| {
            out.fill(0.0);
            let mut st = shared.lock().unwrap();
            mix_overlay(out, dst_channels, &mut st);
        });

        let scratch_len = 1024 * dst_channels;
        let stream =
            build_output_stream(&device, &stream_config, supported.sample_format(), scratch_len, render)
                .context("open overlay stream")?;
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl Default for OverlayMixer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp a requested playback window to the buffer.
///
/// Returns `(start, effective_len)` in samples, or `None` when the offset
/// lies beyond the buffer. A zero `length` requests playback to the end.
fn playback_window(total: usize, offset: usize, length: usize) -> Option<(usize, usize)> {
    if offset > total {
        return None;
    }
    let available = total - offset;
    let len = if length == 0 { available } else { length.min(available) };
    Some((offset, len))
}

/// Additively mix the overlay window into a silence-initialized buffer,
/// advancing the cursor by `step` source frames per output frame.
fn mix_overlay(out: &mut [f32], dst_channels: usize, st: &mut OverlayShared) {
    if st.end == 0 || st.buffer.is_empty() {
        return;
    }

    for frame in out.chunks_mut(dst_channels) {
        let sample_idx = (st.cursor.floor() as usize) * st.channels;
        if sample_idx >= st.end {
            break;
        }

        let left = st.buffer[sample_idx] * st.volume;
        let right = if st.channels > 1 && sample_idx + 1 < st.end {
            st.buffer[sample_idx + 1] * st.volume
        } else {
            left
        };

        match (st.channels > 1, frame.len()) {
            (true, 1) => frame[0] += 0.5 * (left + right),
            (true, _) => {
                frame[0] += left;
                frame[1] += right;
            }
            (false, 1) => frame[0] += left,
            (false, _) => {
                frame[0] += left;
                frame[1] += left;
            }
        }

        st.cursor += st.step;
    }
}

/// Decode a whole file into interleaved `f32` samples.
///
/// Returns `(samples, sample_rate, channels)`.
fn decode_buffer(path: &Path) -> Result<(Vec<f32>, u32, usize)> {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;

    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let codec_params = track.codec_params.clone();

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(anyhow!("no audio data in {:?}", path));
    }

    Ok((samples, rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_with(buffer: Vec<f32>, channels: usize, start: usize, len: usize) -> OverlayShared {
        OverlayShared {
            buffer,
            channels,
            cursor: (start / channels) as f64,
            end: start + len,
            step: 1.0,
            volume: 1.0,
        }
    }

    #[test]
    fn window_plays_requested_range() {
        assert_eq!(playback_window(200, 100, 50), Some((100, 50)));
    }

    #[test]
    fn window_zero_length_plays_to_end() {
        assert_eq!(playback_window(200, 60, 0), Some((60, 140)));
    }

    #[test]
    fn window_clamps_length_to_buffer() {
        assert_eq!(playback_window(200, 180, 50), Some((180, 20)));
    }

    #[test]
    fn window_rejects_offset_beyond_buffer() {
        assert_eq!(playback_window(200, 250, 0), None);
        assert_eq!(playback_window(200, 200, 10), Some((200, 0)));
    }

    #[test]
    fn mix_plays_exact_window_then_goes_silent() {
        let buffer: Vec<f32> = (0..200).map(|i| i as f32 / 1000.0).collect();
        let mut st = shared_with(buffer, 1, 100, 50);

        let mut out = vec![0.0f32; 80];
        mix_overlay(&mut out, 1, &mut st);

        for (i, &sample) in out[..50].iter().enumerate() {
            let expected = (100 + i) as f32 / 1000.0;
            assert!((sample - expected).abs() < 1e-6);
        }
        assert!(out[50..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn mix_scales_by_volume() {
        let buffer = vec![0.5f32; 16];
        let mut st = shared_with(buffer, 1, 0, 16);
        st.volume = 0.5;

        let mut out = vec![0.0f32; 8];
        mix_overlay(&mut out, 1, &mut st);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn zero_volume_mixes_silence() {
        let buffer = vec![0.9f32; 16];
        let mut st = shared_with(buffer, 1, 0, 16);
        st.volume = 0.0;

        let mut out = vec![0.0f32; 8];
        mix_overlay(&mut out, 1, &mut st);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn double_speed_consumes_twice_as_fast() {
        let buffer: Vec<f32> = (0..32).map(|i| i as f32).collect();
        let mut st = shared_with(buffer, 1, 0, 32);
        st.step = 2.0;

        let mut out = vec![0.0f32; 8];
        mix_overlay(&mut out, 1, &mut st);
        assert_eq!(&out[..4], &[0.0, 2.0, 4.0, 6.0]);
        assert_eq!(st.cursor, 16.0);
    }

    #[test]
    fn mono_source_fans_out_to_stereo() {
        let buffer = vec![0.25f32; 8];
        let mut st = shared_with(buffer, 1, 0, 8);

        let mut out = vec![0.0f32; 8];
        mix_overlay(&mut out, 2, &mut st);
        for frame in out.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn stereo_source_folds_down_to_mono() {
        let buffer = vec![0.2f32, 0.6f32, 0.2, 0.6, 0.2, 0.6];
        let mut st = shared_with(buffer, 2, 0, 6);

        let mut out = vec![0.0f32; 3];
        mix_overlay(&mut out, 1, &mut st);
        for &sample in &out {
            assert!((sample - 0.4).abs() < 1e-6);
        }
    }

    #[test]
    fn play_on_missing_file_fails_without_state_change() {
        let mut mixer = OverlayMixer::new();
        let result = mixer.play(Path::new("/nonexistent/overlay.wav"), 0, 0);
        assert!(result.is_err());
        assert_eq!(mixer.current_len(), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut mixer = OverlayMixer::new();
        mixer.stop();
        mixer.stop();
        assert_eq!(mixer.current_len(), 0);
    }
}
