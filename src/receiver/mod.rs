//! Receiver pipeline (spec.md §2, §4.3-§4.10, §5): the push/pull graph
//! that inverts the sender's — a router demultiplexing inbound packets
//! by session, a per-session reorder/repair/depacketize/resample chain,
//! and a mixer summing every active session into the output frame.

pub mod delayed;
pub mod depacketizer;
pub mod reorder;
pub mod resampler;
pub mod router;
pub mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver as ChannelReceiver;
use parking_lot::Mutex;

use crate::config::ReceiverConfig;
use crate::core_util::Ticker;
use crate::fec::CodecPair;
use crate::io::{Datagram, SampleSink};
use crate::packet::Packet;

pub use delayed::{DelayedReader, DepthHandle};
pub use depacketizer::Depacketizer;
pub use reorder::ReorderQueue;
pub use resampler::Resampler;
pub use router::Router;
pub use session::Session;

/// A pull-style source of decoded packets, sorted and gap-free from the
/// caller's point of view except where the producer has genuinely
/// withheld a packet (a reorder-queue underflow, or a still-warming
/// delayed reader). Implemented by [`ReorderQueue`] and, generically,
/// by anything wrapping another `PacketSource` (`DelayedReader`).
pub trait PacketSource: Send {
    fn read(&mut self) -> Option<Packet>;
}

/// A pull-style source of fixed-size sample frames. The unit of pull
/// between the depacketizer, resampler and mixer — deliberately
/// decoupled from the RTP `samples_per_packet` stride, since the sound
/// sink pulls at its own buffer size.
pub trait FrameReader: Send {
    fn read(&mut self, n_frames: usize) -> crate::frame::Frame;
}

/// A snapshot of receiver state safe to read from outside the pipeline
/// thread (spec.md §5 reserves session state to the pipeline thread
/// itself; this is a periodically-published copy, not a live view).
#[derive(Debug, Clone, Default)]
pub struct ReceiverStats {
    pub active_sessions: usize,
    pub samples_produced: u64,
}

/// Owns the receiver's pipeline thread: pulls frames from [`Router`] +
/// [`crate::mixer::Mixer`] at the sound sink's rate and writes them out,
/// draining the inbound datagram channel on every iteration (spec.md §5,
/// "Pipeline thread(s)... receiver... pulling frames at the sound
/// card's rate").
pub struct Receiver {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ReceiverStats>>,
}

impl Receiver {
    pub fn spawn(
        config: ReceiverConfig,
        datagrams: ChannelReceiver<Datagram>,
        mut sink: Box<dyn SampleSink>,
        frame_len: usize,
        fec_codec: Option<CodecPair>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let stats = Arc::new(Mutex::new(ReceiverStats::default()));
        let stats_thread = stats.clone();

        let handle = thread::spawn(move || {
            let mut router = Router::new(config, fec_codec);
            let mut ticker = Ticker::new();

            while !stop_thread.load(Ordering::Relaxed) {
                for datagram in datagrams.try_iter() {
                    router.handle_datagram(datagram);
                }

                router.tick(frame_len as u64);
                ticker.advance(frame_len as u64);

                let mut frame = router.pull_mix(frame_len);
                frame.clip();
                sink.write(&frame.samples);

                let mut stats = stats_thread.lock();
                stats.active_sessions = router.session_count();
                stats.samples_produced = ticker.now();
            }
        });

        Self { stop, handle: Some(handle), stats }
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats.lock().clone()
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.stop();
    }
}
