//! In-memory stand-ins for the sound I/O and network I/O layers spec.md
//! §1 names as external collaborators out of scope for this crate.
//! Used by this crate's own unit tests and, behind the `testutil`
//! feature, by downstream end-to-end tests driving a full
//! [`crate::sender::Sender`]/[`crate::receiver::Receiver`] pair without
//! a sound card or a socket — matching how the teacher keeps its own
//! test fixtures as plain `#[cfg(test)]` code rather than a separate
//! crate.

use std::net::SocketAddr;
use std::sync::Arc;

use crossbeam_channel::{Receiver as ChannelReceiver, Sender as ChannelSender};
use parking_lot::Mutex;

use crate::io::{Datagram, SampleSink, SampleSource};
use crate::packet::Packet;

/// Plays out a fixed buffer of samples once, then reports end of stream
/// (a short read, including zero, per spec.md §4.1's write-head flush
/// rule).
pub struct VecSampleSource {
    samples: Vec<f32>,
    pos: usize,
}

impl VecSampleSource {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples, pos: 0 }
    }
}

impl SampleSource for VecSampleSource {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let remaining = self.samples.len() - self.pos;
        let n = remaining.min(out.len());
        out[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// Collects every frame the receiver pipeline writes out into a shared
/// buffer a test can inspect once the pipeline thread has stopped.
#[derive(Clone, Default)]
pub struct VecSampleSink {
    samples: Arc<Mutex<Vec<f32>>>,
}

impl VecSampleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }
}

impl SampleSink for VecSampleSink {
    fn write(&mut self, frame: &[f32]) {
        self.samples.lock().extend_from_slice(frame);
    }
}

/// Drains every packet currently ready on `packets`, addresses each as a
/// datagram `from -> to`, and forwards it to `out` — the in-process
/// stand-in for a UDP socket carrying a sender's composed packets to a
/// receiver's bound port. A scenario test that needs loss, duplication
/// or reordering drains `packets` into a `Vec<Packet>` itself, transforms
/// it, and addresses the result the same way rather than going through
/// this helper.
pub fn relay(packets: &ChannelReceiver<Packet>, from: SocketAddr, to: SocketAddr, out: &ChannelSender<Datagram>) {
    for packet in packets.try_iter() {
        let _ = out.send(Datagram { src: from, dst: to, bytes: packet.bytes().clone() });
    }
}

/// Addresses a single already-drained packet as a datagram and forwards
/// it — the primitive [`relay`] is built on, exposed directly for
/// scenario tests that drop, duplicate or reorder packets before
/// delivery.
pub fn deliver(packet: &Packet, from: SocketAddr, to: SocketAddr, out: &ChannelSender<Datagram>) {
    let _ = out.send(Datagram { src: from, dst: to, bytes: packet.bytes().clone() });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_source_reports_short_read_at_end() {
        let mut src = VecSampleSource::new(vec![1.0, 2.0, 3.0]);
        let mut buf = [0.0f32; 2];
        assert_eq!(src.read(&mut buf), 2);
        assert_eq!(buf, [1.0, 2.0]);
        assert_eq!(src.read(&mut buf), 1);
        assert_eq!(buf[0], 3.0);
        assert_eq!(src.read(&mut buf), 0);
    }

    #[test]
    fn vec_sink_accumulates_written_frames() {
        let mut sink = VecSampleSink::new();
        sink.write(&[1.0, 2.0]);
        sink.write(&[3.0]);
        assert_eq!(sink.samples(), vec![1.0, 2.0, 3.0]);
    }
}
