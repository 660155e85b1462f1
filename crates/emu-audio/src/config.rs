//! Audio configuration: requested output format, resampling quality, presets.

use std::str::FromStr;

use anyhow::anyhow;

/// Resampling quality selector.
///
/// This is a construction-time choice; the engine instantiates the matching
/// strategy when a fragment queue is bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleQuality {
    /// Nearest-neighbor sample selection. Cheapest, lowest quality.
    Nearest,
    /// Windowed-sinc interpolation, kernel half-width 2.
    Lanczos2,
    /// Windowed-sinc interpolation, kernel half-width 3.
    Lanczos3,
}

impl ResampleQuality {
    /// Label used in the status report.
    pub fn label(self) -> &'static str {
        match self {
            ResampleQuality::Nearest => "Quality 1, nearest neighbor",
            ResampleQuality::Lanczos2 => "Quality 2, Lanczos (a = 2)",
            ResampleQuality::Lanczos3 => "Quality 3, Lanczos (a = 3)",
        }
    }
}

impl FromStr for ResampleQuality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Ok(ResampleQuality::Nearest),
            "lanczos-2" | "lanczos2" => Ok(ResampleQuality::Lanczos2),
            "lanczos-3" | "lanczos3" => Ok(ResampleQuality::Lanczos3),
            other => Err(anyhow!("invalid resampling quality: {other}")),
        }
    }
}

/// Named latency/quality trade-offs.
///
/// A preset fixes the fragment size, headroom, buffer size, and resampling
/// quality together; `Custom` leaves whatever the caller configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    Custom,
    LowQualityMediumLag,
    HighQualityMediumLag,
    HighQualityLowLag,
    UltraQualityMinimalLag,
}

impl Preset {
    /// Label used in the status report.
    pub fn label(self) -> &'static str {
        match self {
            Preset::Custom => "Custom",
            Preset::LowQualityMediumLag => "Low quality, medium lag",
            Preset::HighQualityMediumLag => "High quality, medium lag",
            Preset::HighQualityLowLag => "High quality, low lag",
            Preset::UltraQualityMinimalLag => "Ultra quality, minimal lag",
        }
    }
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "custom" => Ok(Preset::Custom),
            "low" => Ok(Preset::LowQualityMediumLag),
            "high" => Ok(Preset::HighQualityMediumLag),
            "high-low-lag" => Ok(Preset::HighQualityLowLag),
            "ultra" => Ok(Preset::UltraQualityMinimalLag),
            other => Err(anyhow!("invalid audio preset: {other}")),
        }
    }
}

/// Requested output configuration.
///
/// `sample_rate` and `fragment_size` are what we ask the device for; the
/// negotiated hardware values may differ and are reported separately.
/// `headroom` and `buffer_size` are counted in half-fragments, so odd values
/// express "n and a half fragments" of slack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    /// Requested device sample rate in Hz.
    pub sample_rate: u32,
    /// Requested hardware buffer size in frames per callback.
    pub fragment_size: u32,
    /// Two-channel output when `true`, mono otherwise.
    pub stereo: bool,
    /// Output device identifier; 0 selects the system default.
    pub device: u32,
    /// Volume percent, 0..=100.
    pub volume: u32,
    /// Whether emulation audio is enabled at all.
    pub enabled: bool,
    /// Resampling strategy for the fragment stream.
    pub quality: ResampleQuality,
    /// Active preset, `Custom` when the knobs were set individually.
    pub preset: Preset,
    /// Prebuffer headroom in half-fragments.
    pub headroom: u32,
    /// Queue depth target in half-fragments, on top of the headroom.
    pub buffer_size: u32,
}

impl AudioConfig {
    /// Output channel count implied by the stereo flag.
    pub fn channels(&self) -> u16 {
        if self.stereo { 2 } else { 1 }
    }

    /// Apply a named preset, overriding the individual trade-off knobs.
    pub fn apply_preset(&mut self, preset: Preset) {
        self.preset = preset;
        let (fragment_size, headroom, buffer_size, quality) = match preset {
            Preset::Custom => return,
            Preset::LowQualityMediumLag => (1024, 5, 6, ResampleQuality::Nearest),
            Preset::HighQualityMediumLag => (1024, 5, 6, ResampleQuality::Lanczos2),
            Preset::HighQualityLowLag => (512, 3, 4, ResampleQuality::Lanczos2),
            Preset::UltraQualityMinimalLag => (128, 2, 2, ResampleQuality::Lanczos3),
        };
        self.fragment_size = fragment_size;
        self.headroom = headroom;
        self.buffer_size = buffer_size;
        self.quality = quality;
    }
}

impl Default for AudioConfig {
    /// Defaults match the high-quality/medium-lag preset at 44.1 kHz stereo.
    fn default() -> Self {
        let mut config = Self {
            sample_rate: 44_100,
            fragment_size: 1024,
            stereo: true,
            device: 0,
            volume: 100,
            enabled: true,
            quality: ResampleQuality::Lanczos2,
            preset: Preset::HighQualityMediumLag,
            headroom: 5,
            buffer_size: 6,
        };
        config.apply_preset(Preset::HighQualityMediumLag);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_parses_known_names() {
        assert_eq!(
            "nearest".parse::<ResampleQuality>().unwrap(),
            ResampleQuality::Nearest
        );
        assert_eq!(
            "lanczos-2".parse::<ResampleQuality>().unwrap(),
            ResampleQuality::Lanczos2
        );
        assert_eq!(
            "LANCZOS3".parse::<ResampleQuality>().unwrap(),
            ResampleQuality::Lanczos3
        );
    }

    #[test]
    fn quality_rejects_unknown_names() {
        assert!("linear".parse::<ResampleQuality>().is_err());
        assert!("".parse::<ResampleQuality>().is_err());
    }

    #[test]
    fn preset_overrides_knobs() {
        let mut config = AudioConfig::default();
        config.apply_preset(Preset::UltraQualityMinimalLag);
        assert_eq!(config.fragment_size, 128);
        assert_eq!(config.quality, ResampleQuality::Lanczos3);
        assert_eq!(config.preset, Preset::UltraQualityMinimalLag);
    }

    #[test]
    fn custom_preset_leaves_knobs_alone() {
        let mut config = AudioConfig::default();
        config.fragment_size = 2048;
        config.apply_preset(Preset::Custom);
        assert_eq!(config.fragment_size, 2048);
        assert_eq!(config.preset, Preset::Custom);
    }

    #[test]
    fn channels_follow_stereo_flag() {
        let mut config = AudioConfig::default();
        assert_eq!(config.channels(), 2);
        config.stereo = false;
        assert_eq!(config.channels(), 1);
    }
}
