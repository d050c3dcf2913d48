//! Depacketizer (spec.md §4.6): turns a stream of packets pulled from
//! upstream (the delayed reader) into a continuous, gap-filled sample
//! stream. Tracks the expected RTP timestamp and substitutes silence for
//! timestamp gaps rather than ever pulling the mixer's stride out of
//! sync with wall-clock playout.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::codec::SampleCodec;
use crate::packet::seq::ts_diff;
use crate::packet::{channel_count, ChannelMask, Packet};
use crate::receiver::{FrameReader, PacketSource};

pub struct Depacketizer<S> {
    upstream: S,
    codec: Arc<dyn SampleCodec>,
    channels: ChannelMask,
    channel_count: usize,
    t_expected: Option<u32>,
    /// Size (in interleaved samples) of a silence chunk substituted when
    /// upstream has nothing at all to offer yet (spec.md §4.5: underflow
    /// produces a silent frame). Sized to one nominal packet so a long
    /// stall doesn't require an unbounded single push.
    fallback_chunk: usize,
    pending: VecDeque<f32>,
}

impl<S: PacketSource> Depacketizer<S> {
    pub fn new(upstream: S, codec: Arc<dyn SampleCodec>, channels: ChannelMask, samples_per_packet: usize) -> Self {
        let channel_count = channel_count(channels);
        Self {
            upstream,
            codec,
            channels,
            channel_count,
            t_expected: None,
            fallback_chunk: samples_per_packet.max(1) * channel_count.max(1),
            pending: VecDeque::new(),
        }
    }

    fn consume_packet(&mut self, p: Packet) {
        let (Some(ts), Some(rtp)) = (p.timestamp(), p.rtp()) else {
            return;
        };
        let duration = rtp.duration.max(1);

        let expected = *self.t_expected.get_or_insert(ts);

        let diff = ts_diff(ts, expected);
        if diff < 0 {
            trace!(ts, expected, "stale packet behind expected timestamp, dropping");
            return;
        }
        if diff > 0 {
            let gap_samples = diff as u64 * self.channel_count as u64;
            self.pending.extend(std::iter::repeat(0.0f32).take(gap_samples as usize));
        }

        let decoded = self.codec.decode(&p.payload());
        self.pending.extend(decoded);
        self.t_expected = Some(ts.wrapping_add(duration));
    }

    /// Drills down to the upstream packet source (see
    /// [`DelayedReader::upstream_mut`]).
    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }

    fn ensure(&mut self, needed: usize) {
        while self.pending.len() < needed {
            match self.upstream.read() {
                Some(p) => self.consume_packet(p),
                None => {
                    let deficit = needed - self.pending.len();
                    let fill = deficit.max(self.fallback_chunk.min(deficit.max(1)));
                    self.pending.extend(std::iter::repeat(0.0f32).take(fill));
                }
            }
        }
    }
}

impl<S: PacketSource + Send> FrameReader for Depacketizer<S> {
    fn read(&mut self, n_frames: usize) -> crate::frame::Frame {
        let needed = n_frames * self.channel_count.max(1);
        self.ensure(needed);
        let samples: Vec<f32> = self.pending.drain(0..needed).collect();
        crate::frame::Frame { channels: self.channels, samples }
    }
}
