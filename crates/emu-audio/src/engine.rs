//! Output device engine: owns the hardware stream and the real-time callback.
//!
//! The engine bridges the emulation-side fragment queue to the device. The
//! hardware callback never blocks, allocates, or touches the queue directly;
//! it delegates to the configured resampler, which pulls fragments through a
//! policy closure owned here. Configuration calls that mutate callback-shared
//! state (volume factor, resampler instance) take the same mutex the callback
//! takes, so the callback never observes a torn update.
//!
//! ## Underrun policy
//! Once the queue runs dry the pull closure refuses to dequeue again until
//! the queue has re-accumulated the prebuffer fragment count. The hysteresis
//! prevents rapid underrun/running toggling at low latency settings.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;

use crate::config::{AudioConfig, ResampleQuality};
use crate::device::{self, DeviceEntry};
use crate::overlay::OverlayMixer;
use crate::queue::FragmentQueue;
use crate::resample::{Format, FragmentPull, LanczosResampler, NearestResampler, Resampler};
use crate::status::EngineStatus;
use crate::stream::{RenderFn, build_output_stream};
use crate::timing::EmulationTiming;

/// Engine lifecycle. `Streaming` and `Muted` both hold a live device handle;
/// the difference is whether the hardware callback is scheduled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Closed,
    Opening,
    Streaming,
    Muted,
}

/// Format actually negotiated with the device; may differ from the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct HardwareFormat {
    sample_rate: u32,
    fragment_size: u32,
    channels: u16,
}

/// State shared with the hardware callback, guarded by one mutex.
struct CallbackShared {
    resampler: Option<Box<dyn Resampler>>,
    volume: f32,
}

/// Primary audio output engine.
pub struct SoundEngine {
    config: AudioConfig,
    host: cpal::Host,
    devices: Vec<DeviceEntry>,
    device_id: u32,
    hw: Option<HardwareFormat>,
    stream: Option<cpal::Stream>,
    shared: Arc<Mutex<CallbackShared>>,
    queue: Option<Arc<FragmentQueue>>,
    underrun: Arc<AtomicBool>,
    muted: bool,
    state: EngineState,
    overlay: OverlayMixer,
    timing: Option<EmulationTiming>,
    last_about: String,
}

impl SoundEngine {
    /// Create an engine with the given configuration. The device itself is
    /// opened lazily on the first [`Self::open`].
    pub fn new(config: AudioConfig) -> Self {
        let host = cpal::default_host();
        let devices = device::query_devices(&host);
        tracing::debug!(count = devices.len(), "output devices enumerated");

        let muted = !config.enabled;
        Self {
            config,
            host,
            devices,
            device_id: 0,
            hw: None,
            stream: None,
            shared: Arc::new(Mutex::new(CallbackShared {
                resampler: None,
                volume: 1.0,
            })),
            queue: None,
            underrun: Arc::new(AtomicBool::new(true)),
            muted,
            state: EngineState::Closed,
            overlay: OverlayMixer::new(),
            timing: None,
            last_about: String::new(),
        }
    }

    /// Enumerated output devices; id 0 is the system default.
    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Replace the configuration; takes effect on the next [`Self::open`].
    pub fn reconfigure(&mut self, config: AudioConfig) {
        self.config = config;
    }

    /// Bind a fragment queue and timing descriptor, (re)opening the device
    /// only when the requested format or device identity changed.
    ///
    /// On failure the engine stays in a defined silent state; the caller can
    /// log the error and continue without sound.
    pub fn open(&mut self, queue: Arc<FragmentQueue>, timing: EmulationTiming) -> Result<()> {
        tracing::debug!("sound open started");

        if self.needs_reopen() {
            self.open_device().context("open audio device")?;
        }
        self.timing = Some(timing);

        self.mute(true);

        queue.ignore_overflows(!self.config.enabled);
        if !self.config.enabled {
            self.state = EngineState::Muted;
            tracing::info!("sound disabled");
            return Ok(());
        }

        self.overlay.set_device(self.device_id);
        self.underrun.store(true, Ordering::Relaxed);
        self.queue = Some(queue.clone());

        let _ = self.set_volume(self.config.volume);
        self.init_resampler(&queue);

        let about = self.status().render();
        if about != self.last_about {
            tracing::info!("{about}");
            self.last_about = about;
        }

        let muted = self.muted;
        self.mute(muted);
        self.state = if muted {
            EngineState::Muted
        } else {
            EngineState::Streaming
        };

        tracing::debug!("sound open finished");
        Ok(())
    }

    /// Mute, then detach the queue. The resampler (and any checked-out
    /// fragment) is dropped under the callback lock, so the callback only
    /// ever sees the bound state or the detached state, never in between.
    pub fn close(&mut self) {
        if self.hw.is_none() {
            return;
        }

        self.muted = self.mute(true);
        self.shared.lock().unwrap().resampler = None;
        self.queue = None;
        self.state = EngineState::Closed;
    }

    /// Pause (`true`) or resume (`false`) the hardware stream. Returns the
    /// previous mute state so callers can restore it later.
    pub fn mute(&mut self, state: bool) -> bool {
        let was_muted = self.state != EngineState::Streaming;

        if let Some(stream) = &self.stream {
            let result = if state {
                stream.pause().map_err(|e| e.to_string())
            } else {
                stream.play().map_err(|e| e.to_string())
            };
            if let Err(e) = result {
                tracing::warn!("stream pause/resume failed: {e}");
            }
            if matches!(self.state, EngineState::Streaming | EngineState::Muted) {
                self.state = if state {
                    EngineState::Muted
                } else {
                    EngineState::Streaming
                };
            }
        }
        self.overlay.pause(state);

        was_muted
    }

    /// Flip the enabled state, pausing or resuming the stream. Returns the
    /// new enabled state.
    pub fn toggle_mute(&mut self) -> bool {
        let enabled = !self.config.enabled;
        self.set_enabled(enabled);

        self.muted = !enabled;
        let muted = self.muted;
        self.mute(muted);
        // An in-flight overlay keeps playing across the toggle.
        self.overlay.resume();

        tracing::info!("sound {}", if enabled { "unmuted" } else { "muted" });
        enabled
    }

    /// Enable or disable emulation audio without tearing down the device.
    /// While disabled the queue tolerates overflows and the overlay mixes
    /// at zero volume.
    pub fn set_enabled(&mut self, enable: bool) {
        self.config.enabled = enable;
        if let Some(queue) = &self.queue {
            queue.ignore_overflows(!enable);
        }
        self.muted = !enable;

        let factor = if enable {
            self.config.volume as f32 / 100.0
        } else {
            0.0
        };
        self.overlay.set_volume_factor(factor);

        tracing::debug!(enabled = enable, "sound enabled state changed");
    }

    /// Set the volume percent. Rejects values above 100 and calls made
    /// before a device is bound; returns whether the update was applied.
    pub fn set_volume(&mut self, percent: u32) -> bool {
        if percent > 100 || self.hw.is_none() {
            return false;
        }

        self.config.volume = percent;
        let factor = percent as f32 / 100.0;
        self.shared.lock().unwrap().volume = factor;
        self.overlay
            .set_volume_factor(if self.config.enabled { factor } else { 0.0 });
        true
    }

    /// Step the volume by `direction * 2` percent, enabling audio when
    /// stepping up from the disabled state.
    pub fn adjust_volume(&mut self, direction: i32) {
        let percent =
            (i64::from(self.config.volume) + i64::from(direction) * 2).clamp(0, 100) as u32;

        if percent > 0 && direction != 0 && !self.config.enabled {
            self.set_enabled(true);
            self.muted = false;
            self.mute(false);
        }
        let _ = self.set_volume(percent);

        tracing::info!(volume = percent, "volume adjusted");
    }

    /// Diagnostics snapshot.
    pub fn status(&self) -> EngineStatus {
        let hw = self.hw.as_ref();
        EngineStatus {
            enabled: self.config.enabled,
            volume: self.config.volume,
            device: self
                .devices
                .get(self.device_id as usize)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| "Default".to_string()),
            channels: hw.map_or(self.config.channels(), |h| h.channels),
            stereo: self
                .queue
                .as_ref()
                .map_or(self.config.stereo, |q| q.is_stereo()),
            preset: self.config.preset.label().to_string(),
            quality: self.config.quality.label().to_string(),
            fragment_size: hw.map_or(self.config.fragment_size, |h| h.fragment_size),
            sample_rate: hw.map_or(self.config.sample_rate, |h| h.sample_rate),
            headroom: self.config.headroom,
            buffer_size: self.config.buffer_size,
            underrun: self.underrun.load(Ordering::Relaxed),
            overflows: self.queue.as_ref().map_or(0, |q| q.overflow_count()),
        }
    }

    /// Human-readable status report.
    pub fn about(&self) -> String {
        self.status().render()
    }

    /// Play an overlay sound file; see [`OverlayMixer::play`].
    pub fn play_overlay(&mut self, path: &Path, offset: usize, length: usize) -> Result<()> {
        let id = device::clamp_device_id(self.config.device, &self.devices);
        self.overlay.set_device(id);
        self.overlay.play(path, offset, length)
    }

    /// Stop overlay playback; no-op when idle.
    pub fn stop_overlay(&mut self) {
        self.overlay.stop();
    }

    /// Remaining samples in the current overlay window.
    pub fn overlay_len(&self) -> usize {
        self.overlay.current_len()
    }

    /// Overlay playback speed scale; 1.0 plays at the recorded rate.
    pub fn set_overlay_speed(&mut self, speed: f64) {
        self.overlay.set_speed(speed);
    }

    fn needs_reopen(&self) -> bool {
        let requested = device::clamp_device_id(self.config.device, &self.devices);
        match &self.hw {
            None => true,
            Some(hw) => format_changed(&self.config, hw) || requested != self.device_id,
        }
    }

    fn open_device(&mut self) -> Result<()> {
        self.state = EngineState::Opening;
        let requested = device::clamp_device_id(self.config.device, &self.devices);

        let opened = self.try_open_device(requested);
        if opened.is_err() {
            self.stream = None;
            self.hw = None;
            self.state = EngineState::Closed;
        }
        opened
    }

    fn try_open_device(&mut self, requested: u32) -> Result<()> {
        let device = device::pick_device(&self.host, requested)?;
        let supported =
            device::pick_output_config(&device, self.config.sample_rate, self.config.channels())?;

        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        let mut fragment_size = self.config.fragment_size;
        if let Some(buf) = device::pick_buffer_size(&supported, self.config.fragment_size) {
            if let cpal::BufferSize::Fixed(frames) = buf {
                fragment_size = frames;
            }
            stream_config.buffer_size = buf;
        }

        let shared = self.shared.clone();
        let render: RenderFn = Box::new(move |out| {
            let mut st = shared.lock().unwrap();
            match st.resampler.as_mut() {
                Some(resampler) => {
                    resampler.fill(out);
                    apply_volume(out, st.volume);
                }
                None => out.fill(0.0),
            }
        });

        let scratch_len = fragment_size as usize * stream_config.channels as usize;
        let stream = build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            scratch_len,
            render,
        )?;
        // Hold the new stream paused until open() decides the mute state.
        if let Err(e) = stream.pause() {
            tracing::warn!("could not pause fresh stream: {e}");
        }

        self.hw = Some(HardwareFormat {
            sample_rate: stream_config.sample_rate,
            fragment_size,
            channels: stream_config.channels,
        });
        self.device_id = requested;
        self.stream = Some(stream);

        tracing::info!(
            device = requested,
            sample_rate = stream_config.sample_rate,
            fragment_size,
            channels = stream_config.channels,
            "audio device opened"
        );
        Ok(())
    }

    fn init_resampler(&mut self, queue: &Arc<FragmentQueue>) {
        let Some(hw) = &self.hw else { return };
        let Some(timing) = self.timing else { return };

        let pull = make_pull(
            queue.clone(),
            self.underrun.clone(),
            timing.prebuffer_fragment_count(),
        );
        let format_from = Format::new(
            timing.audio_sample_rate(),
            queue.fragment_size(),
            queue.is_stereo(),
        );
        let format_to = Format::new(hw.sample_rate, hw.fragment_size, hw.channels > 1);

        let resampler: Box<dyn Resampler> = match self.config.quality {
            ResampleQuality::Nearest => {
                Box::new(NearestResampler::new(format_from, format_to, pull))
            }
            ResampleQuality::Lanczos2 => {
                Box::new(LanczosResampler::new(format_from, format_to, pull, 2))
            }
            ResampleQuality::Lanczos3 => {
                Box::new(LanczosResampler::new(format_from, format_to, pull, 3))
            }
        };

        self.shared.lock().unwrap().resampler = Some(resampler);
    }
}

/// Scale every sample by the volume factor. Applied exactly once, after
/// resampling.
pub(crate) fn apply_volume(out: &mut [f32], volume: f32) {
    for sample in out.iter_mut() {
        *sample *= volume;
    }
}

/// Whether the requested format no longer matches the negotiated one.
fn format_changed(config: &AudioConfig, hw: &HardwareFormat) -> bool {
    config.sample_rate != hw.sample_rate || config.fragment_size != hw.fragment_size
}

/// Build the fragment pull closure handed to the resampler.
///
/// While underrun, dequeuing stays suspended until the queue reaches the
/// prebuffer count; the exhausted fragment is still recycled so the pool
/// does not shrink. The underrun flag tracks whether the last pull yielded
/// a fragment.
pub(crate) fn make_pull(
    queue: Arc<FragmentQueue>,
    underrun: Arc<AtomicBool>,
    prebuffer: u32,
) -> FragmentPull {
    Box::new(move |recycle| {
        let next = if underrun.load(Ordering::Relaxed) && queue.size() < prebuffer as usize {
            if let Some(fragment) = recycle {
                queue.recycle(fragment);
            }
            None
        } else {
            queue.dequeue(recycle)
        };

        underrun.store(next.is_none(), Ordering::Relaxed);
        next
    })
}
