//! Collaborator traits for the I/O this crate does not itself perform
//! (spec.md §1: "sound I/O layer" and "network I/O layer" are named
//! out of scope). The pipeline threads (spec.md §5) block on these,
//! nothing else; production binaries supply real implementations
//! (`cpal`-backed sound I/O, a UDP socket loop), and `testutil` supplies
//! in-memory doubles for the end-to-end scenario tests.

use bytes::Bytes;
use std::net::SocketAddr;

/// The sender pipeline thread's one blocking point besides clock pacing
/// (spec.md §5). Mono or interleaved multi-channel floats, matching
/// whatever channel mask the sender is configured for.
pub trait SampleSource: Send {
    /// Fills `out` with up to `out.len()` interleaved samples. Returns
    /// the count actually written; a short read (including zero) signals
    /// end of stream to the packetizer, which flushes and discards any
    /// partial write-head packet (spec.md §4.1).
    fn read(&mut self, out: &mut [f32]) -> usize;
}

/// The receiver pipeline thread's one blocking point besides the
/// jitter-buffer condition while warming (spec.md §5).
pub trait SampleSink: Send {
    fn write(&mut self, frame: &[f32]);
}

/// A datagram ready to be routed: raw bytes plus where it came from.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub bytes: Bytes,
}
