//! The sample-domain unit of pull/push between audio stages (spec.md
//! §3, "Frame"): an ordered, contiguous, interleaved run of samples over
//! a fixed channel layout.

use crate::packet::{channel_count, ChannelMask};

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub channels: ChannelMask,
    /// Interleaved samples (L, R, L, R, ... for a stereo mask).
    pub samples: Vec<f32>,
}

impl Frame {
    pub fn silence(channels: ChannelMask, frames: usize) -> Self {
        Self {
            channels,
            samples: vec![0.0; frames * channel_count(channels)],
        }
    }

    pub fn channel_count(&self) -> usize {
        channel_count(self.channels)
    }

    /// Number of per-channel sample frames (`samples.len() / channels`).
    pub fn len_frames(&self) -> usize {
        let cc = self.channel_count();
        if cc == 0 {
            0
        } else {
            self.samples.len() / cc
        }
    }

    /// Sums `other` into `self` sample-wise, in place. Channels present
    /// in `other` but absent from `self` are not added (spec.md §4.9:
    /// "channels absent in a contributor contribute zero" — this method
    /// assumes the caller has already widened `self` to the union mask
    /// before mixing in contributors).
    pub fn mix_in(&mut self, other: &Frame) {
        for (a, b) in self.samples.iter_mut().zip(other.samples.iter()) {
            *a += b;
        }
    }

    /// Remaps this frame's interleaved samples onto a wider channel mask
    /// (spec.md §4.9: "channels absent in a contributor contribute
    /// zero"). Every channel bit this frame already carries keeps its
    /// samples; bits present in `target` but absent here read as
    /// silence. `target` must be a superset of `self.channels`.
    pub fn widen_to(&self, target: ChannelMask) -> Frame {
        if target == self.channels {
            return self.clone();
        }

        let src_slots: Vec<u32> = (0..32).filter(|bit| self.channels & (1 << bit) != 0).collect();
        let dst_slots: Vec<u32> = (0..32).filter(|bit| target & (1 << bit) != 0).collect();
        let dst_cc = dst_slots.len();
        let n_frames = self.len_frames();

        let mut samples = vec![0.0f32; n_frames * dst_cc];
        for (src_idx, bit) in src_slots.iter().enumerate() {
            let Some(dst_idx) = dst_slots.iter().position(|b| b == bit) else {
                continue;
            };
            for frame in 0..n_frames {
                samples[frame * dst_cc + dst_idx] = self.samples[frame * src_slots.len() + src_idx];
            }
        }

        Frame { channels: target, samples }
    }

    /// Clips every sample to `[-1.0, 1.0]` (spec.md §3: values outside
    /// this range are permitted in intermediate buffers but clipped at
    /// playout).
    pub fn clip(&mut self) {
        for s in self.samples.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
    }
}
