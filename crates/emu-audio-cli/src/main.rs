//! Demo CLI for the emulator audio engine.
//!
//! ## Pipeline
//! 1. **Produce**: a synthesized tone fills fixed-size `i16` fragments at the
//!    emulated sample rate, paced by wall clock.
//! 2. **Queue**: fragments trade through the bounded fragment queue.
//! 3. **Playback**: the hardware callback pulls fragments through the
//!    configured resampler and applies the volume scale.
//!
//! ## Modes
//! - `devices`: list output devices.
//! - `tone`: play a sine tone through the full fragment pipeline.
//! - `overlay`: play a sound file via the overlay mixer.

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing_subscriber::EnvFilter;

use emu_audio::config::{AudioConfig, Preset, ResampleQuality};
use emu_audio::engine::SoundEngine;
use emu_audio::queue::FragmentQueue;
use emu_audio::timing::EmulationTiming;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let _ = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    });

    let mut config = AudioConfig {
        device: args.device,
        volume: args.volume.min(100),
        sample_rate: args.sample_rate,
        fragment_size: args.fragment_size,
        quality: args.quality.parse::<ResampleQuality>()?,
        ..AudioConfig::default()
    };
    config.preset = Preset::Custom;

    match args.cmd {
        cli::Command::Devices => run_devices(config),
        cli::Command::Tone {
            freq,
            source_rate,
            secs,
        } => run_tone(config, freq, source_rate, secs, &shutdown_rx),
        cli::Command::Overlay {
            path,
            offset,
            length,
            speed,
        } => run_overlay(config, &path, offset, length, speed, &shutdown_rx),
    }
}

fn run_devices(config: AudioConfig) -> Result<()> {
    let engine = SoundEngine::new(config);
    for entry in engine.devices() {
        println!("#{}: {}", entry.id, entry.name);
    }
    Ok(())
}

fn run_tone(
    config: AudioConfig,
    freq: f64,
    source_rate: u32,
    secs: f64,
    shutdown: &Receiver<()>,
) -> Result<()> {
    let timing = EmulationTiming::new(source_rate, config.headroom, config.buffer_size);
    let queue = Arc::new(FragmentQueue::new(
        config.fragment_size,
        timing.audio_queue_capacity(),
        config.stereo,
    ));

    let mut engine = SoundEngine::new(config);
    engine.open(queue.clone(), timing)?;
    tracing::info!("\n{}", engine.about());

    let stereo = queue.is_stereo();
    let fragment_frames = queue.fragment_size() as usize;
    let fragment_period = Duration::from_secs_f64(fragment_frames as f64 / f64::from(source_rate));
    let total_fragments =
        (secs * f64::from(source_rate) / fragment_frames as f64).ceil() as u64;

    let phase_step = std::f64::consts::TAU * freq / f64::from(source_rate);
    let mut phase = 0.0f64;
    let mut lease = queue.lease();

    // Pre-fill the prebuffer so playback starts without an audible ramp-up.
    let mut produced = 0u64;
    for _ in 0..timing.prebuffer_fragment_count() {
        fill_sine(&mut lease, stereo, &mut phase, phase_step);
        lease = queue.enqueue(lease);
        produced += 1;
    }

    while produced < total_fragments {
        fill_sine(&mut lease, stereo, &mut phase, phase_step);
        lease = queue.enqueue(lease);
        produced += 1;

        match shutdown.recv_timeout(fragment_period) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    engine.close();
    Ok(())
}

fn fill_sine(fragment: &mut [i16], stereo: bool, phase: &mut f64, phase_step: f64) {
    let channels = if stereo { 2 } else { 1 };
    for frame in fragment.chunks_mut(channels) {
        let sample = (phase.sin() * 0.6 * 32767.0) as i16;
        for slot in frame.iter_mut() {
            *slot = sample;
        }
        *phase = (*phase + phase_step) % std::f64::consts::TAU;
    }
}

fn run_overlay(
    config: AudioConfig,
    path: &Path,
    offset: usize,
    length: usize,
    speed: f64,
    shutdown: &Receiver<()>,
) -> Result<()> {
    let mut engine = SoundEngine::new(config);
    engine.set_enabled(true);
    engine.set_overlay_speed(speed);
    engine.play_overlay(path, offset, length)?;
    tracing::info!(remaining = engine.overlay_len(), "overlay playing");

    while engine.overlay_len() > 0 {
        match shutdown.recv_timeout(Duration::from_millis(50)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    engine.stop_overlay();
    Ok(())
}
