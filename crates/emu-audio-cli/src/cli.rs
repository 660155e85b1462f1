use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "emu-audio", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Output device id (0 = system default; see `devices`)
    #[arg(long, default_value_t = 0)]
    pub device: u32,

    /// Resampling quality: nearest, lanczos-2, lanczos-3
    #[arg(long, default_value = "lanczos-2")]
    pub quality: String,

    /// Volume percent (0-100)
    #[arg(long, default_value_t = 100)]
    pub volume: u32,

    /// Requested device sample rate in Hz
    #[arg(long, default_value_t = 44_100)]
    pub sample_rate: u32,

    /// Requested fragment size in frames
    #[arg(long, default_value_t = 1024)]
    pub fragment_size: u32,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List output devices and exit
    Devices,

    /// Synthesize a test tone and play it through the fragment pipeline
    Tone {
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        freq: f64,

        /// Emulated source sample rate in Hz
        #[arg(long, default_value_t = 31_400)]
        source_rate: u32,

        /// Playback duration in seconds
        #[arg(long, default_value_t = 5.0)]
        secs: f64,
    },

    /// Play a sound file through the overlay mixer
    Overlay {
        /// Path to the sound file (WAV)
        path: PathBuf,

        /// Start offset in samples
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Sample count to play (0 = to end)
        #[arg(long, default_value_t = 0)]
        length: usize,

        /// Playback speed scale (1.0 = recorded rate)
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },
}
