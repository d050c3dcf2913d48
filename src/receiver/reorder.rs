//! Reorder queue (spec.md §4.4): a bounded, insertion-sorted queue keyed
//! by RTP sequence number (signed-difference ordering). Restores the
//! order the interleaver scattered on the sender side and absorbs
//! network reordering within its capacity.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::core_util::RateLimiter;
use crate::error::ResourceError;
use crate::packet::seq::seq_cmp;
use crate::packet::Packet;

/// How often "reorder queue full" may log, in dropped-packet counts
/// rather than samples — this queue has no sample-domain clock of its
/// own, unlike the sender's I/O handoff channel (spec.md §7, "Repeated
/// exhaustion is logged at a throttled rate").
const FULL_LOG_PERIOD: u64 = 100;

/// `write()` drops the new packet when the queue is already at capacity
/// rather than evicting anything already held — a full reorder queue
/// means the downstream consumer has fallen behind its drain rate, not
/// that the new arrival should bump something the pipeline is already
/// about to release.
#[derive(Debug)]
pub struct ReorderQueue {
    capacity: usize,
    items: VecDeque<Packet>,
    full_log: RateLimiter,
    drops: u64,
}

impl ReorderQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::new(),
            full_log: RateLimiter::new(FULL_LOG_PERIOD),
            drops: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Inserts `packet`, keeping the queue sorted ascending by sequence
    /// number. Duplicates (same sequence number as an already-held
    /// packet) are dropped and logged; the queue is full, the new
    /// packet is dropped and logged.
    pub fn write(&mut self, packet: Packet) {
        let Some(seq) = packet.sequence() else {
            debug!("packet with no RTP sequence reached the reorder queue, dropping");
            return;
        };

        if self.items.len() >= self.capacity {
            self.drops += 1;
            if self.full_log.try_next(self.drops) {
                warn!(seq, error = %ResourceError::QueueFull { capacity: self.capacity }, "reorder queue full, dropping packet");
            }
            return;
        }

        let pos = self.items.partition_point(|p| {
            let existing = p.sequence().expect("queue only ever holds sequenced packets");
            seq_cmp(existing, seq).is_le()
        });

        if pos > 0 {
            let prev = self.items[pos - 1].sequence().unwrap();
            if prev == seq {
                debug!(seq, "duplicate sequence number dropped");
                return;
            }
        }

        self.items.insert(pos, packet);
    }

    /// Pops the lowest-sequence packet, if any.
    pub fn pop(&mut self) -> Option<Packet> {
        self.items.pop_front()
    }

    pub fn peek(&self) -> Option<&Packet> {
        self.items.front()
    }
}

impl crate::receiver::PacketSource for ReorderQueue {
    fn read(&mut self) -> Option<Packet> {
        self.pop()
    }
}
