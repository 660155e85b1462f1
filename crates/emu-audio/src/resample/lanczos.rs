//! Lanczos windowed-sinc resampling.
//!
//! Each output sample convolves `2a` source taps centered on the fractional
//! position with `sinc(x) * sinc(x / a)` weights, normalized to unit sum so
//! constant signals pass through unchanged. Taps that would read outside the
//! checked-out fragment clamp to its first/last frame instead of reaching
//! into a neighbor that may already be recycled.

use super::{Format, FragmentPull, FragmentStream, Resampler, write_frame};

/// Windowed-sinc interpolation with kernel half-width `a` (2 or 3).
pub struct LanczosResampler {
    stream: FragmentStream,
    format_to: Format,
    a: u32,
    last: [f32; 2],
}

impl LanczosResampler {
    /// Panics on an unsupported kernel half-width; that is a configuration
    /// bug, not a runtime condition.
    pub fn new(format_from: Format, format_to: Format, pull: FragmentPull, a: u32) -> Self {
        assert!(
            a == 2 || a == 3,
            "unsupported Lanczos kernel half-width: {a}"
        );
        Self {
            stream: FragmentStream::new(format_from, format_to, pull),
            format_to,
            a,
            last: [0.0; 2],
        }
    }

    fn convolve(&self) -> (f32, f32) {
        let a = i64::from(self.a);
        let position = self.stream.position();
        let center = position.floor() as i64;

        let mut left = 0.0f64;
        let mut right = 0.0f64;
        let mut weight_sum = 0.0f64;

        for tap in (center - a + 1)..=(center + a) {
            let weight = lanczos_weight(self.a, position - tap as f64);
            left += weight * f64::from(self.stream.sample(tap, 0));
            right += weight * f64::from(self.stream.sample(tap, 1));
            weight_sum += weight;
        }

        ((left / weight_sum) as f32, (right / weight_sum) as f32)
    }
}

impl Resampler for LanczosResampler {
    fn fill(&mut self, out: &mut [f32]) {
        let channels = self.format_to.channels();
        let src_stereo = self.stream.channels() == 2;

        for frame in out.chunks_mut(channels) {
            if self.stream.ensure_fragment() {
                let (left, right) = self.convolve();
                self.last = [left, right];
                write_frame(frame, src_stereo, left, right);
                self.stream.advance();
            } else {
                write_frame(frame, src_stereo, self.last[0], self.last[1]);
            }
        }
    }
}

/// Kernel weight at offset `x` from the interpolation center.
fn lanczos_weight(a: u32, x: f64) -> f64 {
    let a = f64::from(a);
    let ax = x.abs();
    if ax < 1e-12 {
        return 1.0;
    }
    if ax >= a {
        return 0.0;
    }
    let pix = std::f64::consts::PI * x;
    a * pix.sin() * (pix / a).sin() / (pix * pix)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn kernel_is_one_at_center_and_zero_at_edges() {
        assert!((lanczos_weight(2, 0.0) - 1.0).abs() < 1e-12);
        assert_eq!(lanczos_weight(2, 2.0), 0.0);
        assert_eq!(lanczos_weight(3, 3.5), 0.0);
    }

    #[test]
    fn kernel_is_symmetric() {
        for a in [2u32, 3] {
            for x in [0.25, 0.5, 1.1, 1.9] {
                let diff = (lanczos_weight(a, x) - lanczos_weight(a, -x)).abs();
                assert!(diff < 1e-12);
            }
        }
    }

    #[test]
    #[should_panic(expected = "unsupported Lanczos kernel half-width")]
    fn unsupported_half_width_is_fatal() {
        let recycled = Arc::new(AtomicUsize::new(0));
        let pull = scripted_pull(vec![], recycled);
        let format = Format::new(1000, 4, false);
        let _ = LanczosResampler::new(format, format, pull, 4);
    }

    #[test]
    fn fill_produces_exactly_requested_length() {
        for len in [1usize, 2, 9, 63, 128] {
            let recycled = Arc::new(AtomicUsize::new(0));
            let pull = scripted_pull(vec![ramp_fragment(0, 16, true)], recycled);
            let from = Format::new(32_000, 16, true);
            let to = Format::new(48_000, 512, true);
            let mut resampler = LanczosResampler::new(from, to, pull, 3);

            let mut out = vec![f32::NAN; len];
            resampler.fill(&mut out);
            assert!(out.iter().all(|s| s.is_finite()), "len {len} left gaps");
        }
    }

    #[test]
    fn identity_ratio_reproduces_input_within_bounds() {
        // Integer phases put every tap weight except the center at a sinc
        // zero, so the identity ratio is exact up to rounding.
        let recycled = Arc::new(AtomicUsize::new(0));
        let input = ramp_fragment(-500, 32, false);
        let pull = scripted_pull(vec![input.clone()], recycled);
        let format = Format::new(44_100, 32, false);
        let mut resampler = LanczosResampler::new(format, format, pull, 2);

        let mut out = vec![0.0f32; 32];
        resampler.fill(&mut out);
        for (sample, expected) in out.iter().zip(&input) {
            let expected = f32::from(*expected) / 32767.0;
            assert!((sample - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn constant_signal_survives_resampling() {
        // Weight normalization keeps DC level intact at any ratio.
        let recycled = Arc::new(AtomicUsize::new(0));
        let fragments = vec![vec![8192i16; 16], vec![8192i16; 16], vec![8192i16; 16]];
        let pull = scripted_pull(fragments, recycled);
        let from = Format::new(31_400, 16, false);
        let to = Format::new(48_000, 512, false);
        let mut resampler = LanczosResampler::new(from, to, pull, 3);

        let mut out = vec![0.0f32; 48];
        resampler.fill(&mut out);
        let expected = 8192.0 / 32767.0;
        for &sample in &out {
            assert!((sample - expected).abs() < 1e-4, "got {sample}");
        }
    }

    #[test]
    fn midpoint_of_ramp_interpolates_linearly() {
        // A symmetric kernel at phase 0.5 lands exactly between neighbors.
        let recycled = Arc::new(AtomicUsize::new(0));
        let pull = scripted_pull(vec![ramp_fragment(0, 16, false)], recycled);
        let from = Format::new(1000, 16, false);
        let to = Format::new(2000, 32, false);
        let mut resampler = LanczosResampler::new(from, to, pull, 2);

        let mut out = vec![0.0f32; 16];
        resampler.fill(&mut out);
        // Output frame 9 sits at source position 4.5, well clear of edges.
        let expected = 4.5 / 32767.0;
        assert!((out[9] - expected).abs() < 2e-4, "got {}", out[9]);
    }

    #[test]
    fn underrun_holds_last_sample_flat() {
        let recycled = Arc::new(AtomicUsize::new(0));
        let pull = scripted_pull(vec![vec![1000i16; 4]], recycled);
        let format = Format::new(1000, 4, false);
        let mut resampler = LanczosResampler::new(format, format, pull, 2);

        let mut out = vec![0.0f32; 12];
        resampler.fill(&mut out);
        let held = out[3];
        for &sample in &out[4..] {
            assert_eq!(sample, held);
        }
    }
}
