//! Emulation-side timing descriptor consumed by the output engine.
//!
//! The emulation core produces fragments at its own clock; the engine needs
//! that rate plus the derived queue sizing: how many fragments must
//! accumulate before playback resumes after an underrun, and how deep the
//! fragment queue should be overall.

/// Timing parameters handed to [`crate::engine::SoundEngine::open`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmulationTiming {
    audio_sample_rate: u32,
    headroom: u32,
    buffer_size: u32,
}

impl EmulationTiming {
    /// `headroom` and `buffer_size` are in half-fragments, matching
    /// [`crate::config::AudioConfig`].
    pub fn new(audio_sample_rate: u32, headroom: u32, buffer_size: u32) -> Self {
        assert!(audio_sample_rate > 0, "audio sample rate must be positive");
        Self {
            audio_sample_rate,
            headroom,
            buffer_size,
        }
    }

    /// Sample rate at which the emulation core produces fragments, in Hz.
    pub fn audio_sample_rate(&self) -> u32 {
        self.audio_sample_rate
    }

    /// Fragments that must be queued before playback resumes after an
    /// underrun. Always at least one, so the hysteresis gate cannot starve
    /// the callback forever.
    pub fn prebuffer_fragment_count(&self) -> u32 {
        self.headroom.div_ceil(2).max(1)
    }

    /// Total fragment pool depth for the queue: prebuffer headroom plus the
    /// steady-state buffer target.
    pub fn audio_queue_capacity(&self) -> u32 {
        self.prebuffer_fragment_count() + self.buffer_size.div_ceil(2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prebuffer_rounds_half_fragments_up() {
        assert_eq!(EmulationTiming::new(44_100, 5, 6).prebuffer_fragment_count(), 3);
        assert_eq!(EmulationTiming::new(44_100, 4, 6).prebuffer_fragment_count(), 2);
    }

    #[test]
    fn prebuffer_is_at_least_one() {
        assert_eq!(EmulationTiming::new(44_100, 0, 0).prebuffer_fragment_count(), 1);
    }

    #[test]
    fn capacity_covers_prebuffer_and_buffer() {
        let timing = EmulationTiming::new(44_100, 5, 6);
        assert_eq!(timing.audio_queue_capacity(), 6);
        assert!(timing.audio_queue_capacity() > timing.prebuffer_fragment_count());
    }

    #[test]
    #[should_panic(expected = "audio sample rate must be positive")]
    fn zero_rate_is_rejected() {
        let _ = EmulationTiming::new(0, 1, 1);
    }
}
