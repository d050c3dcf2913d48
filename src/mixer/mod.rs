//! Mixer (spec.md §4.9): pulls a frame from every active session and
//! sums them sample-wise into the output frame. A contributor missing a
//! channel the output mask carries contributes zero for it, and a
//! session that under-produces (mid-warmup, or one the router just
//! created) contributes silence for its missing tail.

use crate::frame::Frame;
use crate::packet::{channel_count, ChannelMask};
use crate::receiver::FrameReader;

/// Sums whatever sessions are currently live into one output frame.
/// Stateless by design: the router owns the session set and rebuilds
/// the contributor list fresh every tick (spec.md §4.9, §5 — session
/// state belongs to the pipeline thread, not to the mixer), so `pull`
/// takes the live contributors as a borrowed slice rather than this
/// type owning copies or handles to them.
pub struct Mixer {
    channels: ChannelMask,
}

impl Mixer {
    pub fn new(channels: ChannelMask) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> ChannelMask {
        self.channels
    }

    pub fn pull(&self, contributors: &mut [&mut dyn FrameReader], n_frames: usize) -> Frame {
        let mut contributions: Vec<Frame> = contributors.iter_mut().map(|c| c.read(n_frames)).collect();

        // Channel mask of the output is the union of every contributor's
        // mask (spec.md §4.9), not just the mixer's own configured mask —
        // a contributor reporting channels the mixer wasn't configured
        // with still has those channels widened into the output.
        let union_mask = contributions.iter().fold(self.channels, |acc, c| acc | c.channels);
        let mut out = Frame::silence(union_mask, n_frames);

        for contribution in contributions.iter_mut() {
            let cc = channel_count(contribution.channels).max(1);
            let expected = n_frames * cc;
            if contribution.samples.len() < expected {
                contribution.samples.resize(expected, 0.0);
            }
            let widened = contribution.widen_to(union_mask);
            out.mix_in(&widened);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32, ChannelMask);
    impl FrameReader for Constant {
        fn read(&mut self, n_frames: usize) -> Frame {
            Frame { channels: self.1, samples: vec![self.0; n_frames * channel_count(self.1)] }
        }
    }

    #[test]
    fn sums_contributors_sample_wise() {
        let mixer = Mixer::new(0b11);
        let mut a = Constant(0.2, 0b11);
        let mut b = Constant(0.3, 0b11);
        let mut contributors: Vec<&mut dyn FrameReader> = vec![&mut a, &mut b];
        let out = mixer.pull(&mut contributors, 4);
        for s in out.samples {
            assert!((s - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn no_contributors_is_silence() {
        let mixer = Mixer::new(0b1);
        let out = mixer.pull(&mut [], 8);
        assert!(out.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn undersized_contribution_pads_with_silence() {
        let mixer = Mixer::new(0b11);
        struct Short;
        impl FrameReader for Short {
            fn read(&mut self, _n_frames: usize) -> Frame {
                Frame { channels: 0b11, samples: vec![1.0, 1.0] } // only one frame's worth
            }
        }
        let mut s = Short;
        let mut contributors: Vec<&mut dyn FrameReader> = vec![&mut s];
        let out = mixer.pull(&mut contributors, 4);
        assert_eq!(&out.samples[0..2], &[1.0, 1.0]);
        assert_eq!(&out.samples[2..], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn mono_contributor_mixes_into_stereo_output_on_its_own_channel() {
        // Mixer configured for left-only (0b01); a contributor reporting
        // right-only (0b10) still widens the output mask rather than
        // being forced onto the mixer's own channel (spec.md §4.9: "The
        // channel mask of the output frame is the union of contributors'
        // masks").
        let mixer = Mixer::new(0b01);
        let mut r = Constant(0.5, 0b10);
        let mut contributors: Vec<&mut dyn FrameReader> = vec![&mut r];
        let out = mixer.pull(&mut contributors, 2);
        assert_eq!(out.channels, 0b11);
        assert_eq!(out.samples, vec![0.0, 0.5, 0.0, 0.5]);
    }
}
