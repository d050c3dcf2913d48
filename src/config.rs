//! Sender/receiver configuration (spec.md §6): the fields enumerated
//! there, TOML-loadable the way the teacher's `ServerConfig` is
//! (`#[serde(default = "...")]` per field, `load_from_file`/
//! `save_to_file` built on `toml` + `shellexpand`), plus
//! construction-time validation of the FEC codec/K/R combination
//! (spec.md §7, "Config" errors).

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fec::FecCodecKind;
use crate::packet::ChannelMask;

const MAX_BLOCK_SIZE: u32 = 8192;

fn default_payload_type() -> u8 {
    97
}
fn default_sample_rate() -> u32 {
    44_100
}
fn default_interleave_window() -> usize {
    16
}
fn default_max_fec_blocks() -> usize {
    4
}
fn default_reorder_capacity() -> usize {
    64
}

impl Default for FecCodecKind {
    fn default() -> Self {
        FecCodecKind::None
    }
}

fn validate_fec(codec: FecCodecKind, k: u16, r: u16) -> Result<(), ConfigError> {
    match codec {
        FecCodecKind::None => Ok(()),
        FecCodecKind::ReedSolomon8 | FecCodecKind::LdpcStaircase => {
            if k == 0 {
                return Err(ConfigError::IncompatibleFec { codec, k, r });
            }
            if r == 0 {
                return Err(ConfigError::MissingRepairPackets { codec, k });
            }
            let total = k as u32 + r as u32;
            if total > MAX_BLOCK_SIZE {
                return Err(ConfigError::BlockTooLarge { total, max: MAX_BLOCK_SIZE });
            }
            if codec == FecCodecKind::ReedSolomon8 && total > 256 {
                return Err(ConfigError::BlockTooLarge { total, max: 256 });
            }
            Ok(())
        }
    }
}

/// Sender-side configuration (spec.md §6, "Configuration (sender)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    pub samples_per_packet: usize,
    pub channels: ChannelMask,
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,

    #[serde(default)]
    pub fec_codec: FecCodecKind,
    #[serde(default)]
    pub n_source_packets: u16,
    #[serde(default)]
    pub n_repair_packets: u16,

    #[serde(default)]
    pub interleaving: bool,
    #[serde(default = "default_interleave_window")]
    pub interleave_window: usize,

    #[serde(default)]
    pub clock_pacing: bool,

    pub local_bind: SocketAddr,
    pub source_dest: SocketAddr,
    pub repair_dest: Option<SocketAddr>,
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if crate::packet::channel_count(self.channels) == 0 {
            return Err(ConfigError::EmptyChannelMask);
        }
        validate_fec(self.fec_codec, self.n_source_packets, self.n_repair_packets)?;
        if self.fec_codec != FecCodecKind::None && self.repair_dest.is_none() {
            return Err(ConfigError::InvalidAddress(
                "FEC enabled but no repair destination configured".into(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
        let text = fs::read_to_string(&path).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        fs::write(&path, text).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        Ok(())
    }
}

/// Receiver-side configuration (spec.md §6, "Configuration (receiver)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    pub channels: ChannelMask,
    #[serde(default = "default_payload_type")]
    pub payload_type: u8,

    /// The sender's fixed samples-per-packet, needed to fill in the RTP
    /// `duration` view the wire format itself doesn't carry (spec.md §3:
    /// "RTP {..., duration, ...}" is a decoded view, not a wire field).
    /// Both peers must be configured with the same value; there is no
    /// in-band negotiation (spec.md §1 Non-goals: "discovery/signalling").
    pub samples_per_packet: usize,

    /// `D`: samples held in the jitter buffer before playout starts.
    pub latency_target_samples: u32,
    /// Samples of silence produced before a stalled session is destroyed.
    pub session_timeout_samples: u32,

    #[serde(default)]
    pub resampling: bool,

    #[serde(default)]
    pub fec_codec: FecCodecKind,
    #[serde(default)]
    pub n_source_packets: u16,
    #[serde(default)]
    pub n_repair_packets: u16,
    #[serde(default = "default_max_fec_blocks")]
    pub max_fec_blocks: usize,

    #[serde(default = "default_reorder_capacity")]
    pub reorder_queue_capacity: usize,

    pub source_bind: SocketAddr,
    pub repair_bind: Option<SocketAddr>,
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if crate::packet::channel_count(self.channels) == 0 {
            return Err(ConfigError::EmptyChannelMask);
        }
        validate_fec(self.fec_codec, self.n_source_packets, self.n_repair_packets)?;
        if self.fec_codec != FecCodecKind::None && self.repair_bind.is_none() {
            return Err(ConfigError::InvalidAddress(
                "FEC enabled but no repair bind address configured".into(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
        let text = fs::read_to_string(&path).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = shellexpand::tilde(&path.as_ref().to_string_lossy()).to_string();
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        fs::write(&path, text).map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn rejects_fec_with_zero_k() {
        let cfg = SenderConfig {
            sample_rate: 44100,
            samples_per_packet: 320,
            channels: 0b11,
            payload_type: 97,
            fec_codec: FecCodecKind::ReedSolomon8,
            n_source_packets: 0,
            n_repair_packets: 5,
            interleaving: false,
            interleave_window: 16,
            clock_pacing: false,
            local_bind: addr(0),
            source_dest: addr(5000),
            repair_dest: Some(addr(5002)),
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::IncompatibleFec { .. })));
    }

    #[test]
    fn rejects_empty_channel_mask() {
        let cfg = ReceiverConfig {
            sample_rate: 44100,
            channels: 0,
            payload_type: 97,
            samples_per_packet: 320,
            latency_target_samples: 4000,
            session_timeout_samples: 100_000,
            resampling: false,
            fec_codec: FecCodecKind::None,
            n_source_packets: 0,
            n_repair_packets: 0,
            max_fec_blocks: 4,
            reorder_queue_capacity: 64,
            source_bind: addr(5000),
            repair_bind: None,
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyChannelMask)));
    }

    #[test]
    fn accepts_well_formed_rs_config() {
        let cfg = ReceiverConfig {
            sample_rate: 44100,
            channels: 0b11,
            payload_type: 97,
            samples_per_packet: 320,
            latency_target_samples: 4000,
            session_timeout_samples: 100_000,
            resampling: true,
            fec_codec: FecCodecKind::ReedSolomon8,
            n_source_packets: 20,
            n_repair_packets: 10,
            max_fec_blocks: 4,
            reorder_queue_capacity: 64,
            source_bind: addr(5000),
            repair_bind: Some(addr(5002)),
        };
        assert!(cfg.validate().is_ok());
    }
}
