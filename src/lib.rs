//! `audiobridge-core`: the core pipeline for real-time PCM audio
//! streaming over unreliable UDP transport — packetization, optional
//! forward error correction, reordering, jitter-adaptive playout and
//! mixing. Sound I/O and network I/O are named out of scope (see
//! [`io`]) and supplied by the embedding binary; this crate owns
//! everything from a sample buffer to a composed wire packet and back.

pub mod codec;
pub mod config;
pub mod core_util;
pub mod error;
pub mod fec;
pub mod frame;
pub mod io;
pub mod mixer;
pub mod packet;
pub mod receiver;
pub mod sender;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::{ConfigError, PacketError, ResourceError};
pub use frame::Frame;
pub use mixer::Mixer;
pub use packet::Packet;
pub use receiver::{Receiver, ReceiverStats};
pub use sender::Sender;
