//! Error taxonomy for the streaming core.
//!
//! Mirrors the five buckets the pipeline distinguishes: configuration
//! errors abort startup, malformed-packet and resource-exhaustion errors
//! are per-packet and never unwind past the stage that detected them,
//! loss and session-timeout are expected steady-state conditions handled
//! in-band (not represented as `Err` at all), and fatal invariant
//! violations panic rather than return an error.

use thiserror::Error;

/// Errors that can prevent a [`crate::sender::Sender`] or
/// [`crate::receiver::Receiver`] from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),

    #[error("FEC codec {codec:?} requires n_source_packets > 0 (got K={k}, R={r})")]
    IncompatibleFec {
        codec: crate::fec::FecCodecKind,
        k: u16,
        r: u16,
    },

    #[error("FEC codec {codec:?} has no repair packets configured (K={k}, R=0)")]
    MissingRepairPackets {
        codec: crate::fec::FecCodecKind,
        k: u16,
    },

    #[error("block size K+R={total} exceeds the maximum of {max}")]
    BlockTooLarge { total: u32, max: u32 },

    #[error("no FEC-capable coder available for {0:?}")]
    NoCoder(crate::fec::FecCodecKind),

    #[error("channel mask must select at least one channel")]
    EmptyChannelMask,
}

/// Per-packet errors. These are always recoverable: the offending packet
/// is dropped and the pipeline continues. Call sites log at `warn`/`debug`
/// and discard; this type exists mainly to give `?` a sink to punt to a
/// single `match` arm per stage rather than threading bespoke `Option`
/// returns through every parser.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("RTP header too short: {len} bytes (need at least 12)")]
    RtpHeaderTooShort { len: usize },

    #[error("unsupported RTP version {0}")]
    UnsupportedRtpVersion(u8),

    #[error("RTP padding count {pad} inconsistent with payload length {len}")]
    InconsistentPadding { pad: u8, len: usize },

    #[error("FEC payload ID footer too short: {len} bytes (need at least {need})")]
    FecHeaderTooShort { len: usize, need: usize },

    #[error("unrecognized payload type {0}")]
    UnknownPayloadType(u8),

    #[error("packet does not belong to this port's protocol")]
    ProtocolMismatch,
}

/// Resource exhaustion: buffer pool empty, queue full. Always recoverable,
/// always drops the allocation/packet that triggered it.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("reorder queue at capacity ({capacity})")]
    QueueFull { capacity: usize },

    #[error("I/O handoff channel is full, dropping packet")]
    ChannelFull,
}
