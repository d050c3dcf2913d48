//! Session (spec.md §3, §4.10): per-SSRC receiver state. Owns the full
//! pull chain from reorder queue through to resampled output, an
//! optional FEC reader feeding the bottom of that chain, and the
//! lifecycle bookkeeping (stall/timeout) the router drives each tick.

use std::sync::Arc;

use tracing::debug;

use crate::codec::SampleCodec;
use crate::config::ReceiverConfig;
use crate::fec::block::FecReader;
use crate::fec::CodecPair;
use crate::packet::{ChannelMask, Packet, RtpHeader};
use crate::receiver::{DelayedReader, Depacketizer, FrameReader, PacketSource, ReorderQueue, Resampler};

/// The full per-session pull chain: resampler atop depacketizer atop
/// delayed reader atop reorder queue. Named so `Session` doesn't have
/// to spell out four levels of generic nesting at every use site.
type Chain = Resampler<Depacketizer<DelayedReader<ReorderQueue>>>;

/// Output frames per control-loop tick for the latency control law
/// (spec.md §4.8's `T_tick`), expressed in output frames. 20ms at a
/// typical 48kHz-ish session feels right for a PI loop steering a
/// jitter buffer; not itself spec-fixed.
const CONTROL_TICK_FRAMES: usize = 960;

pub struct Session {
    pub ssrc: u32,
    pub payload_type: u8,
    fec: Option<FecReader>,
    chain: Chain,
    samples_since_packet: u64,
    timeout_samples: u64,
}

impl Session {
    pub fn new(
        rtp: &RtpHeader,
        config: &ReceiverConfig,
        codec: Arc<dyn SampleCodec>,
        samples_per_packet_hint: usize,
        fec_codec: Option<CodecPair>,
    ) -> Self {
        let reorder = ReorderQueue::new(config.reorder_queue_capacity);
        let delayed = DelayedReader::new(reorder, config.latency_target_samples);
        let depth = delayed.depth_handle();
        let depacketizer = Depacketizer::new(delayed, codec, config.channels, samples_per_packet_hint.max(1));
        let chain = Resampler::new(
            depacketizer,
            config.channels,
            depth,
            config.latency_target_samples,
            CONTROL_TICK_FRAMES,
            config.resampling,
        );

        let fec = CodecPair::scheme(config.fec_codec).and_then(|scheme| {
            fec_codec.map(|codec_pair| {
                FecReader::new(scheme, config.n_source_packets, config.n_repair_packets, config.max_fec_blocks, codec_pair)
            })
        });

        debug!(ssrc = rtp.ssrc, payload_type = rtp.payload_type, "session created");

        Self {
            ssrc: rtp.ssrc,
            payload_type: rtp.payload_type,
            fec,
            chain,
            samples_since_packet: 0,
            timeout_samples: config.session_timeout_samples as u64,
        }
    }

    /// Feeds one packet (source or repair) into this session's pipeline.
    /// Resets the stall counter — any arrival, repaired or not, counts
    /// as the session being alive.
    pub fn push_packet(&mut self, packet: Packet) {
        self.samples_since_packet = 0;
        match &mut self.fec {
            Some(reader) => {
                for released in reader.insert(packet) {
                    self.write_reorder(released);
                }
            }
            None => self.write_reorder(packet),
        }
    }

    fn write_reorder(&mut self, packet: Packet) {
        self.chain.inner_mut().upstream_mut().upstream_mut().write(packet);
    }

    /// Advances the stall clock by `samples` (spec.md §3: "measured in
    /// samples of silence produced"). Called once per mixer tick
    /// regardless of whether this session contributed real audio that
    /// tick.
    pub fn tick(&mut self, samples: u64) {
        self.samples_since_packet = self.samples_since_packet.saturating_add(samples);
    }

    /// True once this session has gone a full `session_timeout_samples`
    /// without a packet arriving — the router destroys it on the next
    /// tick where this holds.
    pub fn is_stale(&self) -> bool {
        self.samples_since_packet >= self.timeout_samples
    }
}

impl FrameReader for Session {
    fn read(&mut self, n_frames: usize) -> crate::frame::Frame {
        self.chain.read(n_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PcmF32Be;
    use crate::fec::FecCodecKind;
    use crate::packet::compose_source;
    use bytes::Bytes;

    fn config() -> ReceiverConfig {
        ReceiverConfig {
            sample_rate: 48000,
            channels: 0b1,
            payload_type: 97,
            samples_per_packet: 2,
            latency_target_samples: 4,
            session_timeout_samples: 100,
            resampling: false,
            fec_codec: FecCodecKind::None,
            n_source_packets: 0,
            n_repair_packets: 0,
            max_fec_blocks: 4,
            reorder_queue_capacity: 16,
            source_bind: "127.0.0.1:0".parse().unwrap(),
            repair_bind: None,
        }
    }

    fn packet(seq: u16, ts: u32, samples: &[f32]) -> Packet {
        let mut h = RtpHeader::new(97, 0xAB);
        h.sequence = seq;
        h.timestamp = ts;
        h.duration = samples.len() as u32;
        compose_source(h, PcmF32Be.encode(samples), None)
    }

    #[test]
    fn stale_after_timeout_and_reset_on_packet() {
        let cfg = config();
        let rtp = RtpHeader::new(97, 0xAB);
        let mut s = Session::new(&rtp, &cfg, Arc::new(PcmF32Be), 2, None);
        assert!(!s.is_stale());
        s.tick(100);
        assert!(s.is_stale());
        s.push_packet(packet(0, 0, &[1.0, 2.0]));
        assert!(!s.is_stale());
    }

    #[test]
    fn produces_decoded_samples_once_warm() {
        let cfg = config();
        let rtp = RtpHeader::new(97, 0xAB);
        let mut s = Session::new(&rtp, &cfg, Arc::new(PcmF32Be), 2, None);
        s.push_packet(packet(0, 0, &[1.0, 2.0]));
        s.push_packet(packet(1, 2, &[3.0, 4.0]));
        let frame = s.read(4);
        assert_eq!(frame.samples, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
