//! FEC Payload ID codecs, appended as a footer to the RTP payload.
//!
//! Wire layouts follow the LDPC-Staircase and Reed-Solomon m=8 FEC
//! schemes: LDPC source IDs are 6 bytes (`SBN:u16, ESI:u16, K:u16`), LDPC
//! repair IDs are 8 bytes (adds `N:u16`), and RS-m8 IDs are 6 bytes for
//! both source and repair (`SBN:u24, ESI:u8, K:u16`) — a repair packet is
//! told apart from a source one by which stream/port it arrived on and by
//! `ESI >= K`, not by a distinct wire shape.
//!
//! Per spec: `K` always carries the source block length, and `N` (present
//! only on LDPC repair headers) always carries the total number of
//! encoded symbols K+R. An earlier draft of this footer conflated the two
//! by writing the repair block number into the `K` slot; that was a bug,
//! not a format this codec reproduces.

use bytes::{BufMut, BytesMut};

use crate::error::PacketError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecScheme {
    LdpcStaircase,
    ReedSolomon8,
}

impl FecScheme {
    /// Bit width of the source block number's modular counter.
    pub fn sbn_bits(self) -> u32 {
        match self {
            FecScheme::LdpcStaircase => 16,
            FecScheme::ReedSolomon8 => 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FecHeader {
    pub scheme: FecScheme,
    /// Source block number, already widened to u32 regardless of wire width.
    pub sbn: u32,
    /// Encoding symbol ID. `esi < k` is a source symbol, `esi >= k` is repair.
    pub esi: u16,
    /// Source block length K.
    pub k: u16,
    /// Total number of encoded symbols K+R. Only ever present on LDPC
    /// repair footers; Reed-Solomon packets carry it implicitly via the
    /// session's configured K/R instead.
    pub n: Option<u16>,
}

impl FecHeader {
    pub fn source(scheme: FecScheme, sbn: u32, esi: u16, k: u16) -> Self {
        Self { scheme, sbn, esi, k, n: None }
    }

    pub fn repair(scheme: FecScheme, sbn: u32, esi: u16, k: u16, n: u16) -> Self {
        Self { scheme, sbn, esi, k, n: Some(n) }
    }

    pub fn is_repair(&self) -> bool {
        self.esi >= self.k
    }

    /// Appends this header's wire encoding to `out`. LDPC emits the longer
    /// 8-byte form only when `self.n` is set (repair); Reed-Solomon never
    /// emits `n` on the wire at all.
    pub fn encode(&self, out: &mut BytesMut) {
        match self.scheme {
            FecScheme::LdpcStaircase => {
                out.put_u16(self.sbn as u16);
                out.put_u16(self.esi);
                out.put_u16(self.k);
                if let Some(n) = self.n {
                    out.put_u16(n);
                }
            }
            FecScheme::ReedSolomon8 => {
                let sbn = self.sbn & 0x00FF_FFFF;
                out.put_u8((sbn >> 16) as u8);
                out.put_u8((sbn >> 8) as u8);
                out.put_u8(sbn as u8);
                out.put_u8(self.esi as u8);
                out.put_u16(self.k);
            }
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self.scheme {
            FecScheme::LdpcStaircase => {
                if self.n.is_some() {
                    8
                } else {
                    6
                }
            }
            FecScheme::ReedSolomon8 => 6,
        }
    }

    /// Decodes a footer of the given scheme. `repair` selects which LDPC
    /// shape to expect (6 vs 8 bytes); Reed-Solomon footers are always 6
    /// bytes and `repair` only affects how the caller interprets ESI.
    pub fn decode(scheme: FecScheme, repair: bool, data: &[u8]) -> Result<(Self, usize), PacketError> {
        match scheme {
            FecScheme::LdpcStaircase => {
                let need = if repair { 8 } else { 6 };
                if data.len() < need {
                    return Err(PacketError::FecHeaderTooShort { len: data.len(), need });
                }
                let sbn = u16::from_be_bytes([data[0], data[1]]) as u32;
                let esi = u16::from_be_bytes([data[2], data[3]]);
                let k = u16::from_be_bytes([data[4], data[5]]);
                let n = if repair {
                    Some(u16::from_be_bytes([data[6], data[7]]))
                } else {
                    None
                };
                Ok((Self { scheme, sbn, esi, k, n }, need))
            }
            FecScheme::ReedSolomon8 => {
                if data.len() < 6 {
                    return Err(PacketError::FecHeaderTooShort { len: data.len(), need: 6 });
                }
                let sbn = (u32::from(data[0]) << 16) | (u32::from(data[1]) << 8) | u32::from(data[2]);
                let esi = data[3] as u16;
                let k = u16::from_be_bytes([data[4], data[5]]);
                Ok((Self { scheme, sbn, esi, k, n: None }, 6))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ldpc_source_roundtrip() {
        let h = FecHeader::source(FecScheme::LdpcStaircase, 7, 3, 20);
        let mut buf = BytesMut::new();
        h.encode(&mut buf);
        assert_eq!(buf.len(), 6);
        let (parsed, len) = FecHeader::decode(FecScheme::LdpcStaircase, false, &buf).unwrap();
        assert_eq!(len, 6);
        assert_eq!(parsed, h);
        assert!(!parsed.is_repair());
    }

    #[test]
    fn ldpc_repair_roundtrip() {
        let h = FecHeader::repair(FecScheme::LdpcStaircase, 7, 23, 20, 30);
        let mut buf = BytesMut::new();
        h.encode(&mut buf);
        assert_eq!(buf.len(), 8);
        let (parsed, len) = FecHeader::decode(FecScheme::LdpcStaircase, true, &buf).unwrap();
        assert_eq!(len, 8);
        assert_eq!(parsed, h);
        assert!(parsed.is_repair());
        assert_eq!(parsed.n, Some(30));
    }

    #[test]
    fn rs_source_and_repair_share_shape() {
        let src = FecHeader::source(FecScheme::ReedSolomon8, 0xABCDEF, 5, 20);
        let rep = FecHeader::source(FecScheme::ReedSolomon8, 0xABCDEF, 25, 20);
        let mut sbuf = BytesMut::new();
        let mut rbuf = BytesMut::new();
        src.encode(&mut sbuf);
        rep.encode(&mut rbuf);
        assert_eq!(sbuf.len(), 6);
        assert_eq!(rbuf.len(), 6);
        let (parsed_rep, _) = FecHeader::decode(FecScheme::ReedSolomon8, true, &rbuf).unwrap();
        assert!(parsed_rep.is_repair());
    }

    #[test]
    fn rejects_short_footer() {
        let buf = [0u8; 3];
        assert!(FecHeader::decode(FecScheme::LdpcStaircase, false, &buf).is_err());
        assert!(FecHeader::decode(FecScheme::ReedSolomon8, false, &buf).is_err());
    }
}
