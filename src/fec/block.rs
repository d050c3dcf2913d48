//! Source/repair block grouping: the sender's FEC writer (spec.md §4.2)
//! and the receiver's FEC reader (spec.md §4.3), built on the
//! [`BlockEncoder`]/[`BlockDecoder`] trait seam.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::fec::{CodecPair, Insufficient};
use crate::packet::{self, FecHeader, FecScheme, Packet, RtpHeader};
use crate::packet::seq::sbn_cmp;

/// Groups a stream of `(RtpHeader, payload)` source units into blocks of
/// `k` and invokes the encoder on the k-th. Emits already-composed
/// source packets (RTP + FEC footer) directly; this folds the spec's
/// separate "port composer" step into the writer itself (see
/// DESIGN.md) since composing the wire image is a pure function of
/// data the writer already has in hand.
#[derive(Debug)]
pub struct FecWriter {
    scheme: FecScheme,
    k: u16,
    r: u16,
    codec: CodecPair,
    sbn: u32,
    sbn_modulus: u32,
    pending_headers: Vec<RtpHeader>,
    pending_payloads: Vec<bytes::Bytes>,
}

impl FecWriter {
    pub fn new(scheme: FecScheme, k: u16, r: u16, codec: CodecPair) -> Self {
        let bits = scheme.sbn_bits();
        Self {
            scheme,
            k,
            r,
            codec,
            sbn: 0,
            sbn_modulus: if bits >= 32 { 0 } else { 1u32 << bits },
            pending_headers: Vec::with_capacity(k as usize),
            pending_payloads: Vec::with_capacity(k as usize),
        }
    }

    /// Feeds one source unit. Returns the composed source packet, and —
    /// on the k-th unit of a block — the R composed repair packets too.
    pub fn write(&mut self, rtp: RtpHeader, payload: bytes::Bytes) -> (Packet, Option<Vec<Packet>>) {
        let esi = self.pending_payloads.len() as u16;
        let fec = FecHeader::source(self.scheme, self.sbn, esi, self.k);
        let source_packet = packet::compose_source(rtp, payload.clone(), Some(fec));

        self.pending_headers.push(rtp);
        self.pending_payloads.push(payload);

        if self.pending_payloads.len() < self.k as usize {
            return (source_packet, None);
        }

        let repair_payloads = self.codec.encoder.encode(&self.pending_payloads);
        let n = self.k + self.r;
        let repairs: Vec<Packet> = repair_payloads
            .into_iter()
            .enumerate()
            .map(|(j, payload)| {
                let esi = self.k + j as u16;
                let fec = FecHeader::repair(self.scheme, self.sbn, esi, self.k, n);
                packet::compose_repair(fec, payload)
            })
            .collect();

        trace!(sbn = self.sbn, k = self.k, r = self.r, "fec block complete");
        self.pending_headers.clear();
        self.pending_payloads.clear();
        self.sbn = if self.sbn_modulus == 0 {
            self.sbn.wrapping_add(1)
        } else {
            (self.sbn + 1) % self.sbn_modulus
        };

        (source_packet, Some(repairs))
    }
}

/// One in-flight FEC block on the receiver: a partially (or fully)
/// populated set of `k` source and `r` repair slots for a single SBN.
#[derive(Debug)]
struct Block {
    sbn: u32,
    source: Vec<Option<Packet>>,
    repair: Vec<Option<Packet>>,
}

impl Block {
    fn new(sbn: u32, k: usize, r: usize) -> Self {
        Self {
            sbn,
            source: vec![None; k],
            repair: vec![None; r],
        }
    }

    fn present_count(&self) -> usize {
        self.source.iter().filter(|p| p.is_some()).count() + self.repair.iter().filter(|p| p.is_some()).count()
    }

    fn fully_resolved(&self) -> bool {
        self.source.iter().all(|p| p.is_some())
    }

    fn reference_header(&self) -> Option<RtpHeader> {
        self.source.iter().flatten().next().and_then(|p| p.rtp()).copied()
    }
}

/// Receiver-side FEC block engine: sliding window of up to `max_blocks`
/// partially populated blocks keyed by SBN (spec.md §4.3). Decodes a
/// block the moment it holds >= K symbols and its source side is still
/// incomplete; blocks release in SBN order, forced out by window
/// pressure if they never complete.
#[derive(Debug)]
pub struct FecReader {
    scheme: FecScheme,
    k: u16,
    r: u16,
    max_blocks: usize,
    codec: CodecPair,
    window: VecDeque<Block>,
}

impl FecReader {
    pub fn new(scheme: FecScheme, k: u16, r: u16, max_blocks: usize, codec: CodecPair) -> Self {
        Self {
            scheme,
            k,
            r,
            max_blocks: max_blocks.max(1),
            codec,
            window: VecDeque::new(),
        }
    }

    /// Inserts one incoming packet (source or repair). Returns any
    /// packets now ready for release downstream, in ESI order within a
    /// block and SBN order across blocks.
    pub fn insert(&mut self, packet: Packet) -> Vec<Packet> {
        let Some(fec) = packet.fec().copied() else {
            warn!("packet reached FEC reader with no FEC header, dropping");
            return Vec::new();
        };
        let bits = self.scheme.sbn_bits();
        let sbn = fec.sbn;

        let idx = match self.locate_or_create(sbn, bits) {
            Some(idx) => idx,
            None => {
                debug!(sbn, "dropping out-of-window FEC packet");
                return Vec::new();
            }
        };

        let block = &mut self.window[idx];
        if packet.is_repair() {
            let r_idx = (fec.esi - self.k) as usize;
            if r_idx >= block.repair.len() {
                warn!(sbn, esi = fec.esi, "repair ESI out of range, dropping");
            } else if block.repair[r_idx].is_some() {
                debug!(sbn, esi = fec.esi, "duplicate repair packet dropped");
            } else {
                block.repair[r_idx] = Some(packet);
            }
        } else {
            let s_idx = fec.esi as usize;
            if s_idx >= block.source.len() {
                warn!(sbn, esi = fec.esi, "source ESI out of range, dropping");
            } else if block.source[s_idx].is_some() {
                debug!(sbn, esi = fec.esi, "duplicate source packet dropped");
            } else {
                block.source[s_idx] = Some(packet);
            }
        }

        self.try_decode(idx);

        let mut out = Vec::new();
        self.evict_overflow(&mut out);
        self.drain_resolved_front(&mut out);
        out
    }

    fn locate_or_create(&mut self, sbn: u32, bits: u32) -> Option<usize> {
        if let Some(idx) = self.window.iter().position(|b| b.sbn == sbn) {
            return Some(idx);
        }

        if self.window.is_empty() {
            self.window.push_back(Block::new(sbn, self.k as usize, self.r as usize));
            return Some(0);
        }

        let front_sbn = self.window.front().unwrap().sbn;
        let back_sbn = self.window.back().unwrap().sbn;

        if sbn_cmp(sbn, front_sbn, bits).is_lt() {
            return None;
        }
        if sbn_cmp(sbn, back_sbn, bits).is_gt() {
            self.window.push_back(Block::new(sbn, self.k as usize, self.r as usize));
            return Some(self.window.len() - 1);
        }

        let pos = self
            .window
            .iter()
            .position(|b| sbn_cmp(b.sbn, sbn, bits).is_gt())
            .unwrap_or(self.window.len());
        self.window.insert(pos, Block::new(sbn, self.k as usize, self.r as usize));
        Some(pos)
    }

    fn try_decode(&mut self, idx: usize) {
        let block = &self.window[idx];
        if block.fully_resolved() || block.present_count() < self.k as usize {
            return;
        }

        let mut symbols: Vec<Option<bytes::Bytes>> = Vec::with_capacity((self.k + self.r) as usize);
        for p in &block.source {
            symbols.push(p.as_ref().map(|p| p.payload()));
        }
        for p in &block.repair {
            symbols.push(p.as_ref().map(|p| p.payload()));
        }

        match self.codec.decoder.decode(&symbols) {
            Ok(payloads) => self.apply_decoded(idx, payloads),
            Err(Insufficient) => {
                trace!(sbn = block.sbn, "block not yet decodable");
            }
        }
    }

    fn apply_decoded(&mut self, idx: usize, payloads: Vec<bytes::Bytes>) {
        let sbn = self.window[idx].sbn;
        let Some(reference) = self.window[idx].reference_header() else {
            warn!(sbn, "decoded block but no surviving source packet to derive RTP framing from");
            return;
        };

        let k = self.k;
        // Offset from the surviving reference packet's own ESI, not ESI 0:
        // any surviving source packet lets us extrapolate every other slot's
        // sequence/timestamp since both advance linearly with ESI.
        let ref_esi = self.window[idx]
            .source
            .iter()
            .position(|p| p.is_some())
            .expect("reference_header implies a surviving source packet") as u16;

        for (esi, payload) in payloads.into_iter().enumerate() {
            if self.window[idx].source[esi].is_some() {
                continue;
            }
            let seq = reference.sequence.wrapping_sub(ref_esi).wrapping_add(esi as u16);
            let ts = reference
                .timestamp
                .wrapping_sub(ref_esi as u32 * reference.duration)
                .wrapping_add(esi as u32 * reference.duration);
            let hdr = RtpHeader {
                version: 2,
                padding: false,
                extension: false,
                marker: false,
                payload_type: reference.payload_type,
                sequence: seq,
                timestamp: ts,
                ssrc: reference.ssrc,
                duration: reference.duration,
            };
            let fec = FecHeader::source(self.scheme, sbn, esi as u16, k);
            let recon = packet::compose_source(hdr, payload, Some(fec));
            self.window[idx].source[esi] = Some(recon);
        }
        debug!(sbn, "fec block repaired");
    }

    fn evict_overflow(&mut self, out: &mut Vec<Packet>) {
        while self.window.len() > self.max_blocks {
            let block = self.window.pop_front().unwrap();
            self.release_block(block, out);
        }
    }

    fn drain_resolved_front(&mut self, out: &mut Vec<Packet>) {
        while self.window.front().map(Block::fully_resolved).unwrap_or(false) {
            let block = self.window.pop_front().unwrap();
            self.release_block(block, out);
        }
    }

    fn release_block(&self, block: Block, out: &mut Vec<Packet>) {
        let missing = block.source.iter().filter(|p| p.is_none()).count();
        if missing > 0 {
            debug!(sbn = block.sbn, missing, "releasing block with unrecovered gaps");
        }
        out.extend(block.source.into_iter().flatten());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec::test_fixture::XorParity;
    use crate::fec::CodecPair;
    use bytes::Bytes;
    use std::sync::Arc;

    fn rtp(seq: u16, ts: u32, dur: u32) -> RtpHeader {
        let mut h = RtpHeader::new(97, 0xAAAA);
        h.sequence = seq;
        h.timestamp = ts;
        h.duration = dur;
        h
    }

    fn codec_pair(r: usize) -> CodecPair {
        let xor = Arc::new(XorParity { r });
        CodecPair::new(xor.clone(), xor)
    }

    #[test]
    fn writer_emits_repairs_on_kth_packet() {
        let codec = codec_pair(2);
        let mut w = FecWriter::new(FecScheme::ReedSolomon8, 4, 2, codec);
        for i in 0..3u16 {
            let (_p, repairs) = w.write(rtp(i, i as u32 * 320, 320), Bytes::from(vec![i as u8; 8]));
            assert!(repairs.is_none());
        }
        let (_p, repairs) = w.write(rtp(3, 3 * 320, 320), Bytes::from(vec![3u8; 8]));
        assert_eq!(repairs.unwrap().len(), 2);
    }

    #[test]
    fn reader_recovers_dropped_source_packet() {
        let codec = codec_pair(2);
        let mut w = FecWriter::new(FecScheme::ReedSolomon8, 4, 2, codec.clone());
        let mut sources = Vec::new();
        let mut repairs = Vec::new();
        for i in 0..4u16 {
            let (p, r) = w.write(rtp(i, i as u32 * 320, 320), Bytes::from(vec![i as u8 + 1; 8]));
            sources.push(p);
            if let Some(r) = r {
                repairs = r;
            }
        }

        let mut reader = FecReader::new(FecScheme::ReedSolomon8, 4, 2, 8, codec);
        let mut released = Vec::new();
        // Drop source ESI 1, feed the rest plus one repair.
        for (i, p) in sources.into_iter().enumerate() {
            if i == 1 {
                continue;
            }
            released.extend(reader.insert(p));
        }
        released.extend(reader.insert(repairs[0].clone()));

        assert_eq!(released.len(), 4);
        for (i, p) in released.iter().enumerate() {
            assert_eq!(p.sequence(), Some(i as u16));
        }
    }

    #[test]
    fn reader_evicts_stale_block_with_gaps() {
        let codec = codec_pair(1);
        let mut reader = FecReader::new(FecScheme::ReedSolomon8, 2, 1, 2, codec.clone());

        let mut w = FecWriter::new(FecScheme::ReedSolomon8, 2, 1, codec);
        let mut blocks = Vec::new();
        for b in 0..4u16 {
            let mut block_sources = Vec::new();
            for i in 0..2u16 {
                let seq = b * 2 + i;
                let (p, _r) = w.write(rtp(seq, seq as u32 * 320, 320), Bytes::from(vec![seq as u8; 4]));
                block_sources.push(p);
            }
            blocks.push(block_sources);
        }

        // Feed only one source packet of block 0 (incomplete, will be evicted)
        // then three more full blocks, forcing the window (max_blocks=2) to
        // evict block 0 with its gap.
        let mut released = Vec::new();
        released.extend(reader.insert(blocks[0][0].clone()));
        for block in &blocks[1..] {
            for p in block {
                released.extend(reader.insert(p.clone()));
            }
        }

        // Block 0 contributes only its one surviving packet; blocks 1-3
        // contribute both of theirs once no longer the window's newest.
        let seqs: Vec<u16> = released.iter().filter_map(Packet::sequence).collect();
        assert!(seqs.contains(&0));
        assert!(!seqs.contains(&1));
    }
}
