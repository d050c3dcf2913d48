//! Sender pipeline (spec.md §2, §4.1-§4.2, §4.7, §5): pull/push graph
//! from a sample source through the packetizer, optional interleaver,
//! optional FEC writer, to composed wire packets.

pub mod interleaver;
pub mod packetizer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender as ChannelSender};
use tracing::warn;

use crate::codec::{PcmF32Be, SampleCodec};
use crate::config::SenderConfig;
use crate::core_util::{RateLimiter, Ticker};
use crate::error::{ConfigError, ResourceError};
use crate::fec::block::FecWriter;
use crate::fec::CodecPair;
use crate::io::SampleSource;
use crate::packet::{self, channel_count, Packet, RtpHeader};

use interleaver::Interleaver;
use packetizer::{Packetizer, SourceUnit};

/// The synchronous core of the sender graph: no threads, no I/O. Takes
/// sample chunks, returns composed packets. The thread-owning [`Sender`]
/// below is a thin driver around this.
pub struct SenderPipeline {
    packetizer: Packetizer,
    interleaver: Option<Interleaver<SourceUnit>>,
    fec: Option<FecWriter>,
}

impl SenderPipeline {
    /// `fec_codec` is the external collaborator's encoder/decoder pair
    /// (spec.md §1: the FEC algebra is out of scope for this crate);
    /// required when `config.fec_codec` names a codec, ignored
    /// otherwise.
    pub fn new(config: &SenderConfig, ssrc: u32, fec_codec: Option<CodecPair>) -> Result<Self, ConfigError> {
        config.validate()?;

        let codec: Arc<dyn SampleCodec> = Arc::new(PcmF32Be);
        let packetizer = Packetizer::new(
            codec,
            config.channels,
            config.samples_per_packet,
            config.payload_type,
            ssrc,
        );

        let interleaver = config
            .interleaving
            .then(|| Interleaver::new(config.interleave_window, ssrc as u64));

        let fec = if config.fec_codec == crate::fec::FecCodecKind::None {
            None
        } else {
            let scheme = CodecPair::scheme(config.fec_codec).expect("non-None codec has a wire scheme");
            let codec_pair = fec_codec.ok_or(ConfigError::NoCoder(config.fec_codec))?;
            Some(FecWriter::new(scheme, config.n_source_packets, config.n_repair_packets, codec_pair))
        };

        Ok(Self { packetizer, interleaver, fec })
    }

    /// Feeds one chunk of interleaved samples. Returns every composed
    /// source packet and repair packet produced along the way (a chunk
    /// may span zero, one, or several packet boundaries).
    pub fn push_samples(&mut self, samples: &[f32]) -> (Vec<Packet>, Vec<Packet>) {
        let units = self.packetizer.push(samples);
        let mut sources = Vec::new();
        let mut repairs = Vec::new();
        for unit in units {
            self.emit_unit(unit, &mut sources, &mut repairs);
        }
        (sources, repairs)
    }

    fn emit_unit(&mut self, unit: SourceUnit, sources: &mut Vec<Packet>, repairs: &mut Vec<Packet>) {
        let ready: Vec<SourceUnit> = match &mut self.interleaver {
            Some(il) => il.write(unit).into_iter().collect(),
            None => vec![unit],
        };
        for (rtp, payload) in ready {
            self.compose(rtp, payload, sources, repairs);
        }
    }

    fn compose(&mut self, rtp: RtpHeader, payload: Bytes, sources: &mut Vec<Packet>, repairs: &mut Vec<Packet>) {
        match &mut self.fec {
            Some(writer) => {
                let (source, maybe_repairs) = writer.write(rtp, payload);
                sources.push(source);
                if let Some(r) = maybe_repairs {
                    repairs.extend(r);
                }
            }
            None => sources.push(packet::compose_source(rtp, payload, None)),
        }
    }

    /// Shutdown: discards the packetizer's under-full write-head (spec.md
    /// §4.1) and drains whatever the interleaver is still holding.
    pub fn flush(&mut self) -> (Vec<Packet>, Vec<Packet>) {
        self.packetizer.discard_partial();
        let mut sources = Vec::new();
        let mut repairs = Vec::new();
        if let Some(il) = &mut self.interleaver {
            for unit in il.flush() {
                let (rtp, payload) = unit;
                self.compose(rtp, payload, &mut sources, &mut repairs);
            }
        }
        (sources, repairs)
    }
}

/// Owns the sender's pipeline thread (spec.md §5): reads the sample
/// source at the sample rate (optionally paced by a monotonic clock),
/// drives [`SenderPipeline`], and hands composed packets to the I/O
/// layer over bounded channels. Backpressure: a full outbound channel
/// drops the newest packet rather than blocking the pipeline thread
/// (spec.md, DESIGN NOTES "Thread model").
pub struct Sender {
    source_out: Receiver<Packet>,
    repair_out: Receiver<Packet>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Log a throttled warning at most once per this many samples of audio
/// processed (spec.md §7: "Repeated exhaustion is logged at a throttled
/// rate"), regardless of the configured sample rate's exact value.
const DROP_LOG_PERIOD_SAMPLES: u64 = 44_100;

impl Sender {
    pub fn spawn(
        config: SenderConfig,
        ssrc: u32,
        mut source: Box<dyn SampleSource>,
        fec_codec: Option<CodecPair>,
    ) -> Result<Self, ConfigError> {
        let mut pipeline = SenderPipeline::new(&config, ssrc, fec_codec)?;

        let (source_tx, source_out) = crossbeam_channel::bounded::<Packet>(1024);
        let (repair_tx, repair_out) = crossbeam_channel::bounded::<Packet>(1024);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();

        let channels = config.channels;
        let samples_per_packet = config.samples_per_packet;
        let frame_len = samples_per_packet * channel_count(channels);
        let clock_pacing = config.clock_pacing;
        let frame_period =
            Duration::from_secs_f64(samples_per_packet as f64 / config.sample_rate.max(1) as f64);

        let handle = thread::spawn(move || {
            let mut ticker = Ticker::new();
            let mut buf = vec![0.0f32; frame_len.max(1)];
            let mut next_deadline = Instant::now();
            let mut source_drop_log = RateLimiter::new(DROP_LOG_PERIOD_SAMPLES);
            let mut repair_drop_log = RateLimiter::new(DROP_LOG_PERIOD_SAMPLES);

            while !stop_thread.load(Ordering::Relaxed) {
                let n = source.read(&mut buf);
                if n == 0 {
                    break;
                }
                let (sources, repairs) = pipeline.push_samples(&buf[..n]);
                send_dropping_oldest(&source_tx, sources, &mut source_drop_log, ticker.now());
                send_dropping_oldest(&repair_tx, repairs, &mut repair_drop_log, ticker.now());
                ticker.advance(n as u64);

                if clock_pacing {
                    next_deadline += frame_period;
                    let now = Instant::now();
                    if next_deadline > now {
                        thread::sleep(next_deadline - now);
                    } else {
                        next_deadline = now;
                    }
                }
            }

            let (sources, repairs) = pipeline.flush();
            send_dropping_oldest(&source_tx, sources, &mut source_drop_log, ticker.now());
            send_dropping_oldest(&repair_tx, repairs, &mut repair_drop_log, ticker.now());
        });

        Ok(Self { source_out, repair_out, stop, handle: Some(handle) })
    }

    pub fn source_packets(&self) -> &Receiver<Packet> {
        &self.source_out
    }

    pub fn repair_packets(&self) -> &Receiver<Packet> {
        &self.repair_out
    }

    /// Signals the pipeline thread to stop at the next frame boundary
    /// and joins it (spec.md §5, "Cancellation and shutdown").
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_dropping_oldest(tx: &ChannelSender<Packet>, packets: Vec<Packet>, drop_log: &mut RateLimiter, now: u64) {
    for packet in packets {
        if tx.is_full() {
            // Newest-wins backpressure policy (spec.md DESIGN NOTES):
            // a full handoff channel drops the oldest queued packet
            // rather than blocking the pipeline thread.
            if drop_log.try_next(now) {
                warn!(error = %ResourceError::ChannelFull, "sender I/O handoff channel full, dropping oldest packet");
            }
            let _ = tx.try_recv();
        }
        let _ = tx.try_send(packet);
    }
}
