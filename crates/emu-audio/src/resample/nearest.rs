//! Nearest-neighbor resampling: O(1) per sample, lowest quality.

use super::{Format, FragmentPull, FragmentStream, Resampler, write_frame};

/// Picks the source frame nearest the fractional position, no interpolation.
pub struct NearestResampler {
    stream: FragmentStream,
    format_to: Format,
    last: [f32; 2],
}

impl NearestResampler {
    pub fn new(format_from: Format, format_to: Format, pull: FragmentPull) -> Self {
        Self {
            stream: FragmentStream::new(format_from, format_to, pull),
            format_to,
            last: [0.0; 2],
        }
    }
}

impl Resampler for NearestResampler {
    fn fill(&mut self, out: &mut [f32]) {
        let channels = self.format_to.channels();
        let src_stereo = self.stream.channels() == 2;

        for frame in out.chunks_mut(channels) {
            if self.stream.ensure_fragment() {
                let index = self.stream.position().round() as i64;
                let left = self.stream.sample(index, 0);
                let right = self.stream.sample(index, 1);
                self.last = [left, right];
                write_frame(frame, src_stereo, left, right);
                self.stream.advance();
            } else {
                // Source is dry; hold the last frame flat until data returns.
                write_frame(frame, src_stereo, self.last[0], self.last[1]);
            }
        }
    }
}
