//! RTP fixed header codec (RFC 3550 §5.1).
//!
//! CSRCs are not used by this system (spec'd wire format), but a decoder
//! must still skip over them if a peer sets a nonzero CC, and it must
//! skip a present extension block without needing to understand its
//! contents. Padding is removed by trimming the trailing pad-count byte
//! off the payload, not by the header codec itself (the padding flag and
//! count live in different places).

use bytes::{BufMut, BytesMut};

use crate::error::PacketError;

pub const FIXED_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Samples this packet spans, for this SSRC's clock rate. Not itself
    /// a wire field (RTP has none) — spec.md's "RTP {..., duration, ...}"
    /// view is derived from the session's fixed samples-per-packet and
    /// carried alongside the decoded header so downstream stages (the
    /// depacketizer, the delayed reader's span calculation) don't need
    /// back-channel access to the sender's configuration.
    pub duration: u32,
}

impl RtpHeader {
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            marker: false,
            payload_type,
            sequence: 0,
            timestamp: 0,
            ssrc,
            duration: 0,
        }
    }

    /// Serializes the fixed 12-byte header. CSRC count and extension are
    /// always emitted as zero/absent: this system never sends either.
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u8((self.version << 6) | ((self.padding as u8) << 5) | ((self.extension as u8) << 4));
        out.put_u8(((self.marker as u8) << 7) | (self.payload_type & 0x7f));
        out.put_u16(self.sequence);
        out.put_u32(self.timestamp);
        out.put_u32(self.ssrc);
    }

    /// Parses the fixed header, skipping over CSRCs and an extension block
    /// if present. Returns the header and the number of bytes consumed
    /// from the front of `data` (always >= 12).
    pub fn decode(data: &[u8]) -> Result<(Self, usize), PacketError> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(PacketError::RtpHeaderTooShort { len: data.len() });
        }

        let version = (data[0] >> 6) & 0x03;
        if version != 2 {
            return Err(PacketError::UnsupportedRtpVersion(version));
        }

        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = data[0] & 0x0f;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7f;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut consumed = FIXED_HEADER_LEN + csrc_count as usize * 4;
        if data.len() < consumed {
            return Err(PacketError::RtpHeaderTooShort { len: data.len() });
        }

        if extension {
            if data.len() < consumed + 4 {
                return Err(PacketError::RtpHeaderTooShort { len: data.len() });
            }
            let ext_len_words = u16::from_be_bytes([data[consumed + 2], data[consumed + 3]]) as usize;
            consumed += 4 + ext_len_words * 4;
            if data.len() < consumed {
                return Err(PacketError::RtpHeaderTooShort { len: data.len() });
            }
        }

        Ok((
            Self {
                version,
                padding,
                extension,
                marker,
                payload_type,
                sequence,
                timestamp,
                ssrc,
                duration: 0,
            },
            consumed,
        ))
    }

    /// Fills in the non-wire `duration` field. Callers that know the
    /// session's fixed samples-per-packet (the router, on session
    /// creation; the packetizer, at compose time) call this right after
    /// `decode`/`new` — `duration` is never parsed off the wire.
    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }
}

/// Given the padding flag and the raw bytes that follow the RTP header,
/// returns the payload length with any trailing padding removed.
pub fn strip_padding(rest: &[u8], padding: bool) -> Result<usize, PacketError> {
    if !padding || rest.is_empty() {
        return Ok(rest.len());
    }
    let pad_count = *rest.last().unwrap() as usize;
    if pad_count == 0 || pad_count > rest.len() {
        return Err(PacketError::InconsistentPadding {
            pad: pad_count as u8,
            len: rest.len(),
        });
    }
    Ok(rest.len() - pad_count)
}
