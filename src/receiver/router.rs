//! Router (spec.md §4.10): demultiplexes inbound datagrams into
//! per-SSRC sessions, dispatching each datagram's bytes through the
//! port-fixed protocol parser (spec.md §6, "Protocols at a port"),
//! filling in the RTP duration view the wire itself doesn't carry, and
//! sweeping stale sessions on every pipeline tick.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::codec::{PcmF32Be, SampleCodec};
use crate::config::ReceiverConfig;
use crate::fec::{CodecPair, FecCodecKind};
use crate::frame::Frame;
use crate::io::Datagram;
use crate::mixer::Mixer;
use crate::packet::{self, Packet, PortProtocol, UdpView};
use crate::receiver::{FrameReader, Session};

/// Which port-fixed parser a datagram gets handed to, given which of
/// the two configured ports it arrived at (spec.md §6).
fn port_protocol(codec: FecCodecKind, is_repair_port: bool) -> PortProtocol {
    match (codec, is_repair_port) {
        (FecCodecKind::None, _) => PortProtocol::Rtp,
        (FecCodecKind::ReedSolomon8, false) => PortProtocol::RtpRs8Source,
        (FecCodecKind::ReedSolomon8, true) => PortProtocol::Rs8Repair,
        (FecCodecKind::LdpcStaircase, false) => PortProtocol::RtpLdpcSource,
        (FecCodecKind::LdpcStaircase, true) => PortProtocol::LdpcRepair,
    }
}

pub struct Router {
    config: ReceiverConfig,
    codec: Arc<dyn SampleCodec>,
    fec_codec: Option<CodecPair>,
    mixer: Mixer,
    sessions: HashMap<u32, Session>,
    /// The most recently active SSRC. Repair packets carry no SSRC of
    /// their own (spec.md's repair streams are a distinct port, not
    /// nested RTP), so with more than one live session a repair packet
    /// can't be attributed by content alone; routing it here instead of
    /// to every session is a documented simplification (see DESIGN.md)
    /// that is exact for the common single-session deployment.
    most_recent_ssrc: Option<u32>,
}

impl Router {
    pub fn new(config: ReceiverConfig, fec_codec: Option<CodecPair>) -> Self {
        let mixer = Mixer::new(config.channels);
        Self {
            config,
            codec: Arc::new(PcmF32Be),
            fec_codec,
            mixer,
            sessions: HashMap::new(),
            most_recent_ssrc: None,
        }
    }

    pub fn handle_datagram(&mut self, datagram: Datagram) {
        let is_repair_port = self.config.repair_bind == Some(datagram.dst);
        let protocol = port_protocol(self.config.fec_codec, is_repair_port);
        let udp = UdpView { src: datagram.src, dst: datagram.dst };

        let packet = match packet::parse(protocol, datagram.bytes, Some(udp)) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "malformed datagram dropped");
                return;
            }
        };

        if packet.is_repair() {
            self.handle_repair(packet);
        } else {
            self.handle_source(packet);
        }
    }

    fn handle_source(&mut self, packet: Packet) {
        let Some(rtp) = packet.rtp().copied() else {
            return;
        };
        let packet = packet.with_rtp_duration(self.config.samples_per_packet as u32);

        if let Some(existing) = self.sessions.get(&rtp.ssrc) {
            if existing.payload_type != rtp.payload_type {
                debug!(ssrc = rtp.ssrc, "payload type changed, starting a new session");
                self.sessions.remove(&rtp.ssrc);
            }
        }

        let session = self.sessions.entry(rtp.ssrc).or_insert_with(|| {
            debug!(ssrc = rtp.ssrc, payload_type = rtp.payload_type, "new session");
            Session::new(&rtp, &self.config, self.codec.clone(), self.config.samples_per_packet, self.fec_codec.clone())
        });

        session.push_packet(packet);
        self.most_recent_ssrc = Some(rtp.ssrc);
    }

    fn handle_repair(&mut self, packet: Packet) {
        let Some(ssrc) = self.most_recent_ssrc else {
            trace!("repair packet arrived before any session exists, dropping");
            return;
        };
        match self.sessions.get_mut(&ssrc) {
            Some(session) => session.push_packet(packet),
            None => trace!(ssrc, "repair packet's session no longer exists, dropping"),
        }
    }

    /// Advances every session's stall clock by one tick's worth of
    /// samples and destroys any that have gone a full timeout without a
    /// packet (spec.md §3, session lifecycle: active -> stalled ->
    /// destroyed).
    pub fn tick(&mut self, samples: u64) {
        for session in self.sessions.values_mut() {
            session.tick(samples);
        }
        self.sessions.retain(|ssrc, session| {
            let keep = !session.is_stale();
            if !keep {
                debug!(ssrc, "session timed out, destroyed");
            }
            keep
        });
        if self.most_recent_ssrc.is_some_and(|ssrc| !self.sessions.contains_key(&ssrc)) {
            self.most_recent_ssrc = None;
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Pulls one output frame by summing every live session (spec.md
    /// §4.9). The contributor slice is rebuilt fresh each call since the
    /// session set can change between ticks (spec.md §5: session state
    /// stays owned by the pipeline thread, the mixer itself is
    /// stateless).
    pub fn pull_mix(&mut self, n_frames: usize) -> Frame {
        let mut contributors: Vec<&mut dyn FrameReader> =
            self.sessions.values_mut().map(|s| s as &mut dyn FrameReader).collect();
        self.mixer.pull(&mut contributors, n_frames)
    }
}
