//! Delayed reader (spec.md §4.5): enforces a latency floor `D`,
//! expressed in RTP samples, before playout starts or resumes after an
//! underflow. Wraps any upstream packet source (the reorder queue, in
//! the per-session pipeline) with its own internal accumulation queue
//! whose span is what's actually measured against `D`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::packet::seq::ts_diff;
use crate::packet::Packet;
use crate::receiver::PacketSource;

/// Samples currently spanned by the delayed reader's internal queue,
/// published for the resampler's latency control loop (spec.md §4.8) to
/// read without touching the pipeline thread's owned state directly.
pub type DepthHandle = Arc<AtomicU32>;

pub struct DelayedReader<S> {
    upstream: S,
    target: u32,
    queue: VecDeque<Packet>,
    warming: bool,
    depth: DepthHandle,
}

impl<S: PacketSource> DelayedReader<S> {
    pub fn new(upstream: S, target_samples: u32) -> Self {
        Self {
            upstream,
            target: target_samples,
            queue: VecDeque::new(),
            warming: true,
            depth: Arc::new(AtomicU32::new(0)),
        }
    }

    /// A cheap, cross-thread-readable handle to the current queue span.
    pub fn depth_handle(&self) -> DepthHandle {
        self.depth.clone()
    }

    fn span(&self) -> u32 {
        let (Some(first), Some(last)) = (self.queue.front(), self.queue.back()) else {
            return 0;
        };
        let first_ts = first.timestamp().unwrap_or(0);
        let last_ts = last.timestamp().unwrap_or(0);
        let last_dur = last.rtp().map(|h| h.duration).unwrap_or(0);
        ts_diff(last_ts.wrapping_add(last_dur), first_ts).max(0) as u32
    }

    fn refill(&mut self) {
        while let Some(p) = self.upstream.read() {
            self.queue.push_back(p);
        }
        self.depth.store(self.span(), Ordering::Relaxed);
    }

    /// Drains whatever upstream has ready, then — once warm — returns
    /// the head of the internal queue. Never blocks; an underflow while
    /// warm simply yields `None` (the depacketizer substitutes silence).
    pub fn poll(&mut self) -> Option<Packet> {
        self.refill();

        if self.warming {
            if self.span() >= self.target {
                debug!(span = self.span(), target = self.target, "jitter buffer warm, starting playout");
                self.warming = false;
            } else {
                return None;
            }
        }

        let out = self.queue.pop_front();
        self.depth.store(self.span(), Ordering::Relaxed);
        out
    }

    pub fn is_warming(&self) -> bool {
        self.warming
    }

    /// Drills down to the upstream packet source — used by [`Session`]
    /// to reach the reorder queue at the bottom of the per-session
    /// pull chain and push newly-arrived packets into it.
    ///
    /// [`Session`]: crate::receiver::session::Session
    pub fn upstream_mut(&mut self) -> &mut S {
        &mut self.upstream
    }
}

impl<S: PacketSource> PacketSource for DelayedReader<S> {
    fn read(&mut self) -> Option<Packet> {
        self.poll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{compose_source, RtpHeader};
    use bytes::Bytes;
    use std::collections::VecDeque as Deque;

    struct FakeUpstream(Deque<Packet>);
    impl PacketSource for FakeUpstream {
        fn read(&mut self) -> Option<Packet> {
            self.0.pop_front()
        }
    }

    fn packet(seq: u16, ts: u32, dur: u32) -> Packet {
        let mut h = RtpHeader::new(97, 1);
        h.sequence = seq;
        h.timestamp = ts;
        h.duration = dur;
        compose_source(h, Bytes::from_static(&[0u8; 4]), None)
    }

    #[test]
    fn withholds_playout_until_span_reaches_target() {
        let upstream = FakeUpstream(Deque::from(vec![packet(0, 0, 320), packet(1, 320, 320)]));
        let mut dr = DelayedReader::new(upstream, 960);
        assert!(dr.poll().is_none());
        assert!(dr.is_warming());
    }

    #[test]
    fn releases_once_warm_and_stays_warm() {
        let upstream = FakeUpstream(Deque::from(vec![
            packet(0, 0, 320),
            packet(1, 320, 320),
            packet(2, 640, 320),
        ]));
        let mut dr = DelayedReader::new(upstream, 640);
        let p = dr.poll();
        assert!(p.is_some());
        assert_eq!(p.unwrap().sequence(), Some(0));
        assert!(!dr.is_warming());
        assert_eq!(dr.poll().unwrap().sequence(), Some(1));
    }
}
