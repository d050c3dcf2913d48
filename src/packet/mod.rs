//! Packet: a reference-counted record carrying the wire image of one
//! datagram plus zero or more decoded header views over it.
//!
//! Lower stages parse headers into views without copying the underlying
//! bytes (`bytes::Bytes::slice` is a refcount bump over the same
//! allocation); the invariant from spec.md §3 is enforced by construction
//! here rather than by convention: once a `Packet` exists its `Bytes` is
//! immutable, and `Packet` itself only ever hands out shared references
//! or owned clones of the `Arc`.

pub mod fec_header;
pub mod rtp;
pub mod seq;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

pub use fec_header::{FecHeader, FecScheme};
pub use rtp::RtpHeader;

use crate::error::PacketError;

bitflags::bitflags! {
    /// Which header views a packet carries. A packet accumulates flags as
    /// it travels down the stack; `Composed` is set once its byte image is
    /// final and no stage may mutate it again.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketFlags: u16 {
        const UDP      = 0b0000_0001;
        const RTP      = 0b0000_0010;
        const FEC      = 0b0000_0100;
        const COMPOSED = 0b0000_1000;
        const AUDIO    = 0b0001_0000;
        const REPAIR   = 0b0010_0000;
    }
}

/// Channel layout bit-mask: bit i set means channel i is present.
pub type ChannelMask = u32;

pub fn channel_count(mask: ChannelMask) -> usize {
    mask.count_ones() as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpView {
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

/// The protocol a bound port accepts (spec.md §6, "Protocols at a port").
/// Fixes how a packet arriving at that port is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortProtocol {
    Rtp,
    RtpLdpcSource,
    LdpcRepair,
    RtpRs8Source,
    Rs8Repair,
}

impl PortProtocol {
    pub fn carries_rtp(self) -> bool {
        matches!(self, PortProtocol::Rtp | PortProtocol::RtpLdpcSource | PortProtocol::RtpRs8Source)
    }

    pub fn fec_scheme(self) -> Option<FecScheme> {
        match self {
            PortProtocol::RtpLdpcSource | PortProtocol::LdpcRepair => Some(FecScheme::LdpcStaircase),
            PortProtocol::RtpRs8Source | PortProtocol::Rs8Repair => Some(FecScheme::ReedSolomon8),
            PortProtocol::Rtp => None,
        }
    }

    pub fn is_repair_stream(self) -> bool {
        matches!(self, PortProtocol::LdpcRepair | PortProtocol::Rs8Repair)
    }
}

#[derive(Debug)]
struct PacketInner {
    buf: Bytes,
    flags: PacketFlags,
    udp: Option<UdpView>,
    rtp: Option<RtpHeader>,
    fec: Option<FecHeader>,
    /// Byte range within `buf` of the sample/symbol payload, with RTP
    /// padding and any FEC payload-ID header/footer already excluded.
    payload_range: (usize, usize),
}

/// A packet travelling through the pipeline. Cheap to clone: clones share
/// the same underlying buffer and header views via `Arc`.
#[derive(Debug, Clone)]
pub struct Packet(Arc<PacketInner>);

impl Packet {
    pub fn flags(&self) -> PacketFlags {
        self.0.flags
    }

    pub fn is_composed(&self) -> bool {
        self.0.flags.contains(PacketFlags::COMPOSED)
    }

    pub fn is_repair(&self) -> bool {
        self.0.flags.contains(PacketFlags::REPAIR)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0.buf
    }

    pub fn udp(&self) -> Option<UdpView> {
        self.0.udp
    }

    pub fn rtp(&self) -> Option<&RtpHeader> {
        self.0.rtp.as_ref()
    }

    pub fn fec(&self) -> Option<&FecHeader> {
        self.0.fec.as_ref()
    }

    /// The sample payload (source packets) or repair symbol payload
    /// (repair packets), with framing already stripped.
    pub fn payload(&self) -> Bytes {
        let (start, end) = self.0.payload_range;
        self.0.buf.slice(start..end)
    }

    pub fn sequence(&self) -> Option<u16> {
        self.rtp().map(|h| h.sequence)
    }

    pub fn timestamp(&self) -> Option<u32> {
        self.rtp().map(|h| h.timestamp)
    }

    pub fn ssrc(&self) -> Option<u32> {
        self.rtp().map(|h| h.ssrc)
    }

    /// Attach a UDP source/destination view. Only legal before the packet
    /// is otherwise in use by more than one owner; used by the I/O thread
    /// immediately after receiving a datagram.
    pub fn with_udp(self, udp: UdpView) -> Self {
        let mut inner = (*self.0).clone_inner();
        inner.udp = Some(udp);
        inner.flags |= PacketFlags::UDP;
        Packet(Arc::new(inner))
    }

    /// Fills in the RTP view's non-wire `duration` field (see
    /// [`RtpHeader::with_duration`]). A no-op if this packet carries no
    /// RTP header (repair packets). Called by the router right after
    /// parsing, using the session's configured samples-per-packet.
    pub fn with_rtp_duration(self, duration: u32) -> Self {
        if self.0.rtp.is_none() {
            return self;
        }
        let mut inner = (*self.0).clone_inner();
        inner.rtp = inner.rtp.map(|h| h.with_duration(duration));
        Packet(Arc::new(inner))
    }
}

impl PacketInner {
    fn clone_inner(&self) -> Self {
        Self {
            buf: self.buf.clone(),
            flags: self.flags,
            udp: self.udp,
            rtp: self.rtp,
            fec: self.fec,
            payload_range: self.payload_range,
        }
    }
}

/// Parses a datagram received at a port bound to `protocol`. This is the
/// receiver-side "port parser" of spec.md §4.10.
pub fn parse(protocol: PortProtocol, buf: Bytes, udp: Option<UdpView>) -> Result<Packet, PacketError> {
    let mut flags = PacketFlags::COMPOSED;
    if udp.is_some() {
        flags |= PacketFlags::UDP;
    }

    if protocol.carries_rtp() {
        let (rtp, hdr_len) = RtpHeader::decode(&buf)?;
        let rest = &buf[hdr_len..];
        let rest_len = rtp::strip_padding(rest, rtp.padding)?;
        flags |= PacketFlags::RTP | PacketFlags::AUDIO;

        let (fec, payload_end) = match protocol.fec_scheme() {
            Some(scheme) => {
                let footer_len = scheme.source_footer_len();
                if rest_len < footer_len {
                    return Err(PacketError::FecHeaderTooShort { len: rest_len, need: footer_len });
                }
                let footer_start = hdr_len + rest_len - footer_len;
                let (fec, _) = FecHeader::decode(scheme, false, &buf[footer_start..hdr_len + rest_len])?;
                flags |= PacketFlags::FEC;
                (Some(fec), footer_start)
            }
            None => (None, hdr_len + rest_len),
        };

        Ok(Packet(Arc::new(PacketInner {
            buf,
            flags,
            udp,
            rtp: Some(rtp),
            fec,
            payload_range: (hdr_len, payload_end),
        })))
    } else {
        let scheme = protocol.fec_scheme().expect("repair port without FEC scheme");
        let header_len = scheme.repair_header_len();
        if buf.len() < header_len {
            return Err(PacketError::FecHeaderTooShort { len: buf.len(), need: header_len });
        }
        let (fec, _) = FecHeader::decode(scheme, true, &buf[..header_len])?;
        flags |= PacketFlags::FEC | PacketFlags::REPAIR;

        Ok(Packet(Arc::new(PacketInner {
            buf: buf.clone(),
            flags,
            udp,
            rtp: None,
            fec: Some(fec),
            payload_range: (header_len, buf.len()),
        })))
    }
}

/// Composes a source (audio-bearing) packet: RTP header, sample payload,
/// and — if the port is FEC-capable — a trailing FEC payload-ID footer.
pub fn compose_source(rtp: RtpHeader, payload: Bytes, fec: Option<FecHeader>) -> Packet {
    let footer_len = fec.as_ref().map(FecHeader::encoded_len).unwrap_or(0);
    let mut buf = BytesMut::with_capacity(rtp::FIXED_HEADER_LEN + payload.len() + footer_len);
    rtp.encode(&mut buf);
    let payload_start = buf.len();
    buf.extend_from_slice(&payload);
    let payload_end = buf.len();
    if let Some(f) = &fec {
        f.encode(&mut buf);
    }

    let mut flags = PacketFlags::COMPOSED | PacketFlags::RTP | PacketFlags::AUDIO;
    if fec.is_some() {
        flags |= PacketFlags::FEC;
    }

    Packet(Arc::new(PacketInner {
        buf: buf.freeze(),
        flags,
        udp: None,
        rtp: Some(rtp),
        fec,
        payload_range: (payload_start, payload_end),
    }))
}

/// Composes a repair packet: FEC payload-ID header followed by the repair
/// symbol payload. Repair packets carry no RTP header of their own (see
/// DESIGN.md, "repair port semantics").
pub fn compose_repair(fec: FecHeader, payload: Bytes) -> Packet {
    let mut buf = BytesMut::with_capacity(fec.encoded_len() + payload.len());
    fec.encode(&mut buf);
    let payload_start = buf.len();
    buf.extend_from_slice(&payload);
    let payload_end = buf.len();

    Packet(Arc::new(PacketInner {
        buf: buf.freeze(),
        flags: PacketFlags::COMPOSED | PacketFlags::FEC | PacketFlags::REPAIR,
        udp: None,
        rtp: None,
        fec: Some(fec),
        payload_range: (payload_start, payload_end),
    }))
}

impl FecScheme {
    fn source_footer_len(self) -> usize {
        match self {
            FecScheme::LdpcStaircase => 6,
            FecScheme::ReedSolomon8 => 6,
        }
    }

    fn repair_header_len(self) -> usize {
        match self {
            FecScheme::LdpcStaircase => 8,
            FecScheme::ReedSolomon8 => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rtp() -> RtpHeader {
        let mut h = RtpHeader::new(97, 0x1234_5678);
        h.sequence = 10;
        h.timestamp = 480;
        h
    }

    #[test]
    fn compose_and_parse_plain_rtp() {
        let payload = Bytes::from_static(&[1, 2, 3, 4]);
        let packet = compose_source(sample_rtp(), payload.clone(), None);
        let parsed = parse(PortProtocol::Rtp, packet.bytes().clone(), None).unwrap();
        assert_eq!(parsed.payload(), payload);
        assert_eq!(parsed.sequence(), Some(10));
        assert!(!parsed.flags().contains(PacketFlags::FEC));
    }

    #[test]
    fn compose_and_parse_ldpc_source() {
        let fec = FecHeader::source(FecScheme::LdpcStaircase, 3, 1, 20);
        let payload = Bytes::from_static(&[9, 9, 9]);
        let packet = compose_source(sample_rtp(), payload.clone(), Some(fec));
        let parsed = parse(PortProtocol::RtpLdpcSource, packet.bytes().clone(), None).unwrap();
        assert_eq!(parsed.payload(), payload);
        assert_eq!(parsed.fec(), Some(&fec));
    }

    #[test]
    fn compose_and_parse_rs_repair() {
        let fec = FecHeader::repair(FecScheme::ReedSolomon8, 3, 25, 20, 30);
        let payload = Bytes::from_static(&[7, 7, 7, 7]);
        let packet = compose_repair(fec, payload.clone());
        let parsed = parse(PortProtocol::Rs8Repair, packet.bytes().clone(), None).unwrap();
        assert_eq!(parsed.payload(), payload);
        assert!(parsed.is_repair());
        assert!(parsed.rtp().is_none());
    }

    #[test]
    fn compose_and_parse_ldpc_repair() {
        let fec = FecHeader::repair(FecScheme::LdpcStaircase, 3, 25, 20, 30);
        let payload = Bytes::from_static(&[5, 5]);
        let packet = compose_repair(fec, payload.clone());
        let parsed = parse(PortProtocol::LdpcRepair, packet.bytes().clone(), None).unwrap();
        assert_eq!(parsed.payload(), payload);
        assert_eq!(parsed.fec().unwrap().n, Some(30));
    }
}
