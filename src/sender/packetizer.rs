//! Packetizer (spec.md §4.1): accumulates samples into a write-head
//! buffer and finalizes an RTP-framed source unit each time it fills.

use bytes::Bytes;
use std::sync::Arc;

use crate::codec::SampleCodec;
use crate::packet::{ChannelMask, RtpHeader};

/// One produced, not-yet-composed source unit: an RTP header (sequence
/// and timestamp already assigned) plus its encoded sample payload. The
/// interleaver and FEC writer consume these before a `Packet` is
/// actually composed onto the wire (see `fec::block::FecWriter`).
pub type SourceUnit = (RtpHeader, Bytes);

#[derive(Debug)]
pub struct Packetizer {
    codec: Arc<dyn SampleCodec>,
    channels: ChannelMask,
    channel_count: usize,
    samples_per_packet: usize,
    payload_type: u8,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    write_head: Vec<f32>,
}

impl Packetizer {
    pub fn new(
        codec: Arc<dyn SampleCodec>,
        channels: ChannelMask,
        samples_per_packet: usize,
        payload_type: u8,
        ssrc: u32,
    ) -> Self {
        let channel_count = crate::packet::channel_count(channels);
        Self {
            codec,
            channels,
            channel_count,
            samples_per_packet,
            payload_type,
            ssrc,
            sequence: 0,
            timestamp: 0,
            write_head: Vec::with_capacity(samples_per_packet * channel_count),
        }
    }

    /// Copies `samples` (interleaved) into the write-head, finalizing and
    /// returning every source unit that fills along the way. Frame
    /// boundaries (the caller's `samples` chunk size) and packet
    /// boundaries (`samples_per_packet`) are independent, per spec.md
    /// §4.1 — residual samples simply stay in the write-head.
    pub fn push(&mut self, samples: &[f32]) -> Vec<SourceUnit> {
        self.write_head.extend_from_slice(samples);

        let frame_len = self.samples_per_packet * self.channel_count;
        let mut out = Vec::new();
        while frame_len > 0 && self.write_head.len() >= frame_len {
            let chunk: Vec<f32> = self.write_head.drain(0..frame_len).collect();
            let payload = self.codec.encode(&chunk);

            let header = RtpHeader {
                version: 2,
                padding: false,
                extension: false,
                marker: false,
                payload_type: self.payload_type,
                sequence: self.sequence,
                timestamp: self.timestamp,
                ssrc: self.ssrc,
                duration: self.samples_per_packet as u32,
            };
            self.sequence = self.sequence.wrapping_add(1);
            self.timestamp = self.timestamp.wrapping_add(self.samples_per_packet as u32);

            out.push((header, payload));
        }
        out
    }

    pub fn channels(&self) -> ChannelMask {
        self.channels
    }

    /// Discards whatever is left in the write-head. Called at shutdown:
    /// spec.md §4.1 surfaces no error for an under-full final packet, it
    /// is simply dropped.
    pub fn discard_partial(&mut self) {
        self.write_head.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PcmF32Be;

    #[test]
    fn accumulates_across_frame_boundaries() {
        let mut p = Packetizer::new(Arc::new(PcmF32Be), 0b11, 4, 97, 0x1234);
        // 4 samples/packet * 2 channels = 8 samples per unit.
        assert!(p.push(&[0.0; 3]).is_empty());
        let units = p.push(&[0.0; 10]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].0.sequence, 0);
        assert_eq!(units[0].0.timestamp, 0);
        // 5 residual samples remain in the write-head.
        let units2 = p.push(&[0.0; 3]);
        assert_eq!(units2.len(), 1);
        assert_eq!(units2[0].0.sequence, 1);
        assert_eq!(units2[0].0.timestamp, 4);
    }

    #[test]
    fn discard_partial_drops_residue() {
        let mut p = Packetizer::new(Arc::new(PcmF32Be), 0b1, 4, 97, 1);
        p.push(&[1.0, 2.0]);
        p.discard_partial();
        assert_eq!(p.push(&[0.0; 4]).len(), 1);
    }
}
