//! Sample codec: maps codec-specific RTP payload bytes to floats and
//! back. spec.md §4.6 names this an external collaborator keyed by
//! `payload_type`; the only format in scope (§1 Non-goals: "variable
//! sample formats beyond 32-bit float PCM") is raw big-endian `f32`, so
//! this module supplies that one codec directly rather than a registry
//! with nothing else to register.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encodes/decodes one RTP payload type's sample representation. The
/// depacketizer holds one of these per session, picked by the session's
/// (stable, per spec.md §3) `payload_type`.
pub trait SampleCodec: Send + Sync + std::fmt::Debug {
    fn decode(&self, payload: &Bytes) -> Vec<f32>;
    fn encode(&self, samples: &[f32]) -> Bytes;
    /// Wire bytes per encoded sample, used by the packetizer to size its
    /// write-head buffer.
    fn bytes_per_sample(&self) -> usize;
}

/// 32-bit big-endian linear float PCM, interleaved across channels
/// (spec.md §6, "Plain audio").
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmF32Be;

impl SampleCodec for PcmF32Be {
    fn decode(&self, payload: &Bytes) -> Vec<f32> {
        let mut buf = payload.clone();
        let n = buf.len() / 4;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(buf.get_f32());
        }
        out
    }

    fn encode(&self, samples: &[f32]) -> Bytes {
        let mut out = BytesMut::with_capacity(samples.len() * 4);
        for &s in samples {
            out.put_f32(s);
        }
        out.freeze()
    }

    fn bytes_per_sample(&self) -> usize {
        4
    }
}
