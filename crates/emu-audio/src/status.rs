//! Engine status snapshot and the human-readable status report.

use serde::{Deserialize, Serialize};

/// Diagnostics snapshot of the output engine.
///
/// All values are copies taken under the engine's configuration lock; the
/// snapshot stays valid after the engine moves on.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineStatus {
    /// Whether emulation audio is enabled.
    pub enabled: bool,
    /// Volume percent, 0..=100.
    pub volume: u32,
    /// Selected output device name.
    pub device: String,
    /// Negotiated hardware channel count.
    pub channels: u16,
    /// Whether the fragment stream itself is stereo.
    pub stereo: bool,
    /// Active preset label.
    pub preset: String,
    /// Resampling quality label.
    pub quality: String,
    /// Negotiated fragment size in frames.
    pub fragment_size: u32,
    /// Negotiated sample rate in Hz.
    pub sample_rate: u32,
    /// Configured prebuffer headroom in half-fragments.
    pub headroom: u32,
    /// Configured buffer depth in half-fragments.
    pub buffer_size: u32,
    /// Whether the callback is currently starved of fragments.
    pub underrun: bool,
    /// Fragments dropped by queue overflow since open.
    pub overflows: u64,
}

impl EngineStatus {
    /// Render the report shown by diagnostics UIs and logs.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.enabled {
            out.push_str("Sound disabled\n");
            return out;
        }

        out.push_str("Sound enabled:\n");
        out.push_str(&format!("  Volume:   {}%\n", self.volume));
        out.push_str(&format!("  Device:   {}\n", self.device));
        out.push_str(&format!(
            "  Channels: {} ({})\n",
            self.channels,
            if self.stereo { "Stereo" } else { "Mono" }
        ));
        out.push_str(&format!("  Preset:   {}\n", self.preset));
        out.push_str(&format!("    Fragment size: {} samples\n", self.fragment_size));
        out.push_str(&format!("    Sample rate:   {} Hz\n", self.sample_rate));
        out.push_str(&format!("    Resampling:    {}\n", self.quality));
        out.push_str(&format!(
            "    Headroom:      {:.1} fragments\n",
            0.5 * f64::from(self.headroom)
        ));
        out.push_str(&format!(
            "    Buffer size:   {:.1} fragments\n",
            0.5 * f64::from(self.buffer_size)
        ));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_status() -> EngineStatus {
        EngineStatus {
            enabled: true,
            volume: 80,
            device: "Default".to_string(),
            channels: 2,
            stereo: true,
            preset: "High quality, medium lag".to_string(),
            quality: "Quality 2, Lanczos (a = 2)".to_string(),
            fragment_size: 1024,
            sample_rate: 48_000,
            headroom: 5,
            buffer_size: 6,
            underrun: false,
            overflows: 0,
        }
    }

    #[test]
    fn render_reports_negotiated_format() {
        let report = sample_status().render();
        assert!(report.contains("Sound enabled:"));
        assert!(report.contains("Volume:   80%"));
        assert!(report.contains("Channels: 2 (Stereo)"));
        assert!(report.contains("Fragment size: 1024 samples"));
        assert!(report.contains("Sample rate:   48000 Hz"));
        assert!(report.contains("Resampling:    Quality 2, Lanczos (a = 2)"));
    }

    #[test]
    fn render_formats_half_fragment_counts() {
        let report = sample_status().render();
        assert!(report.contains("Headroom:      2.5 fragments"));
        assert!(report.contains("Buffer size:   3.0 fragments"));
    }

    #[test]
    fn render_collapses_when_disabled() {
        let status = EngineStatus {
            enabled: false,
            ..sample_status()
        };
        assert_eq!(status.render(), "Sound disabled\n");
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let status = sample_status();
        let json = serde_json::to_string(&status).unwrap();
        let back: EngineStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
