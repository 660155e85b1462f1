//! Sample-rate conversion from emulation-clocked fragments to the device rate.
//!
//! A resampler is built from a source format, a destination format, and a
//! fragment pull function injected by the engine. It knows nothing about
//! devices or locking: `fill` is purely computational and its only side
//! effect is invoking the pull function, which makes every strategy testable
//! against a synthetic fragment source.
//!
//! ## Underrun policy
//! When the pull function reports that no fragment is ready, the strategies
//! repeat the last emitted frame (flat hold) instead of inserting silence,
//! avoiding a hard discontinuity click. This is a documented lossy
//! degradation, not an error; consumption resumes at the head of the next
//! fragment once one arrives.

mod lanczos;
mod nearest;

pub use lanczos::LanczosResampler;
pub use nearest::NearestResampler;

use crate::queue::Fragment;

/// Fragment pull function: returns the exhausted fragment for recycling and
/// receives the next one, or `None` on underrun.
pub type FragmentPull = Box<dyn FnMut(Option<Fragment>) -> Option<Fragment> + Send>;

/// Stream format on either side of a resampler. Immutable once bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Format {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per fragment (per channel).
    pub fragment_size: u32,
    /// Two interleaved channels when `true`.
    pub stereo: bool,
}

impl Format {
    pub fn new(sample_rate: u32, fragment_size: u32, stereo: bool) -> Self {
        assert!(sample_rate > 0, "sample rate must be positive");
        assert!(fragment_size > 0, "fragment size must be positive");
        Self {
            sample_rate,
            fragment_size,
            stereo,
        }
    }

    pub fn channels(&self) -> usize {
        if self.stereo { 2 } else { 1 }
    }
}

/// Converts fragments at the source rate into exactly-sized output fills.
pub trait Resampler: Send {
    /// Produce exactly `out.len()` interleaved samples in the destination
    /// channel layout. Shortfalls are policy-filled; partial fills never
    /// happen.
    fn fill(&mut self, out: &mut [f32]);
}

const I16_SCALE: f32 = 32767.0;

/// Source-side cursor shared by the concrete strategies.
///
/// Tracks the checked-out fragment and the fractional read position in
/// source frames. The position advances by `from_rate / to_rate` per output
/// frame; crossing the fragment boundary trades the exhausted fragment back
/// through the pull function.
pub(crate) struct FragmentStream {
    format: Format,
    pull: FragmentPull,
    fragment: Option<Fragment>,
    position: f64,
    step: f64,
}

impl FragmentStream {
    pub(crate) fn new(format_from: Format, format_to: Format, pull: FragmentPull) -> Self {
        Self {
            format: format_from,
            pull,
            fragment: None,
            position: 0.0,
            step: f64::from(format_from.sample_rate) / f64::from(format_to.sample_rate),
        }
    }

    /// Fractional read position within the current fragment, in frames.
    pub(crate) fn position(&self) -> f64 {
        self.position
    }

    /// Make sure the fragment holding the current position is checked out,
    /// trading exhausted fragments in lazily. Nothing is pulled until a
    /// sample is actually needed, so a rebuilt resampler resumes at the
    /// queue's current head.
    ///
    /// Returns `false` while the source is dry; the position is then parked
    /// at the fragment head so playback resumes cleanly.
    pub(crate) fn ensure_fragment(&mut self) -> bool {
        let size = f64::from(self.format.fragment_size);
        loop {
            if self.fragment.is_some() {
                if self.position < size {
                    return true;
                }
                let recycled = self.fragment.take();
                match (self.pull)(recycled) {
                    Some(next) => {
                        self.fragment = Some(next);
                        self.position -= size;
                    }
                    None => {
                        self.position = 0.0;
                        return false;
                    }
                }
            } else {
                match (self.pull)(None) {
                    Some(next) => self.fragment = Some(next),
                    None => {
                        self.position = 0.0;
                        return false;
                    }
                }
            }
        }
    }

    /// Advance the cursor by one output frame. The fragment trade happens
    /// on the next [`Self::ensure_fragment`] call.
    pub(crate) fn advance(&mut self) {
        self.position += self.step;
    }

    /// Read one source sample, clamped to the current fragment's bounds.
    ///
    /// `frame` may fall outside `0..fragment_size` for interpolation taps
    /// near the edges; those taps clamp to the nearest available frame.
    pub(crate) fn sample(&self, frame: i64, channel: usize) -> f32 {
        let Some(fragment) = &self.fragment else {
            return 0.0;
        };
        let channels = self.format.channels();
        let clamped = frame.clamp(0, i64::from(self.format.fragment_size) - 1) as usize;
        f32::from(fragment[clamped * channels + channel.min(channels - 1)]) / I16_SCALE
    }

    /// Source channel count.
    pub(crate) fn channels(&self) -> usize {
        self.format.channels()
    }
}

/// Write one destination frame, mapping source channels to the output
/// layout: mono fans out to both channels, stereo folds down by averaging.
pub(crate) fn write_frame(out: &mut [f32], src_stereo: bool, left: f32, right: f32) {
    match (src_stereo, out.len()) {
        (true, 1) => out[0] = 0.5 * (left + right),
        (true, _) => {
            out[0] = left;
            out[1] = right;
        }
        (false, 1) => out[0] = left,
        (false, _) => {
            out[0] = left;
            out[1] = left;
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Pull function backed by a fixed list of fragments; counts recycles so
    /// tests can assert the one-in-flight contract.
    pub(crate) fn scripted_pull(
        fragments: Vec<Vec<i16>>,
        recycled: Arc<AtomicUsize>,
    ) -> FragmentPull {
        let mut pending: VecDeque<Fragment> = fragments
            .into_iter()
            .map(|f| f.into_boxed_slice())
            .collect();
        Box::new(move |recycle| {
            if recycle.is_some() {
                recycled.fetch_add(1, Ordering::Relaxed);
            }
            pending.pop_front()
        })
    }

    /// Sawtooth test fragment: `start, start+1, ...` per frame, duplicated
    /// across channels when stereo.
    pub(crate) fn ramp_fragment(start: i16, frames: usize, stereo: bool) -> Vec<i16> {
        let mut out = Vec::new();
        for i in 0..frames {
            let v = start + i as i16;
            out.push(v);
            if stereo {
                out.push(v);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn write_frame_maps_channel_layouts() {
        let mut stereo = [0.0f32; 2];
        write_frame(&mut stereo, true, 0.25, 0.75);
        assert_eq!(stereo, [0.25, 0.75]);

        write_frame(&mut stereo, false, 0.5, 0.0);
        assert_eq!(stereo, [0.5, 0.5]);

        let mut mono = [0.0f32; 1];
        write_frame(&mut mono, true, 0.25, 0.75);
        assert!((mono[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stream_trades_fragments_at_boundaries() {
        let recycled = Arc::new(AtomicUsize::new(0));
        let pull = scripted_pull(
            vec![ramp_fragment(0, 4, false), ramp_fragment(100, 4, false)],
            recycled.clone(),
        );
        let from = Format::new(1000, 4, false);
        let to = Format::new(1000, 4, false);
        let mut stream = FragmentStream::new(from, to, pull);

        assert!(stream.ensure_fragment());
        for _ in 0..4 {
            stream.advance();
        }
        assert!(stream.ensure_fragment());
        assert!((stream.sample(0, 0) - 100.0 / 32767.0).abs() < 1e-6);
        assert_eq!(recycled.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn stream_parks_at_head_on_underrun() {
        let recycled = Arc::new(AtomicUsize::new(0));
        let pull = scripted_pull(vec![ramp_fragment(0, 2, false)], recycled);
        let from = Format::new(1000, 2, false);
        let to = Format::new(500, 2, false);
        let mut stream = FragmentStream::new(from, to, pull);

        assert!(stream.ensure_fragment());
        stream.advance();
        assert!(!stream.ensure_fragment());
        assert_eq!(stream.position(), 0.0);
    }

    #[test]
    fn sample_clamps_to_fragment_bounds() {
        let recycled = Arc::new(AtomicUsize::new(0));
        let pull = scripted_pull(vec![ramp_fragment(10, 4, false)], recycled);
        let format = Format::new(1000, 4, false);
        let mut stream = FragmentStream::new(format, format, pull);
        assert!(stream.ensure_fragment());

        let first = stream.sample(0, 0);
        let last = stream.sample(3, 0);
        assert_eq!(stream.sample(-2, 0), first);
        assert_eq!(stream.sample(7, 0), last);
    }
}
