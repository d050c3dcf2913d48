//! FEC block engine: the codec trait seam (spec.md §4.2/§4.3) plus the
//! source/repair block grouping logic used by the sender's FEC writer
//! and the receiver's FEC reader.
//!
//! The FEC algebra itself (matrix arithmetic for LDPC/Reed-Solomon) is
//! named out of scope in spec.md §1 as an external collaborator's job,
//! grouped in the same sentence as the network I/O and sound I/O
//! layers `src/io.rs` leaves as bare traits — this module does the
//! same: [`BlockEncoder`]/[`BlockDecoder`] are traits with no shipped
//! implementation. An embedder constructs a [`CodecPair`] from a real
//! coder (see DESIGN.md) and passes it to `Sender`/`Receiver`, the same
//! way it passes a `SampleSource`/`SampleSink`.

pub mod block;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which FEC codec (if any) a sender/receiver pair is configured for.
/// Fixes the wire footer shape (spec.md §6) and the block decodability
/// rule (spec.md §3). Carries no algebra of its own — it only selects
/// the wire header layout in [`crate::packet::FecScheme`]; the actual
/// encoder/decoder is supplied externally as a [`CodecPair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FecCodecKind {
    None,
    ReedSolomon8,
    LdpcStaircase,
}

impl fmt::Display for FecCodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FecCodecKind::None => write!(f, "none"),
            FecCodecKind::ReedSolomon8 => write!(f, "rs"),
            FecCodecKind::LdpcStaircase => write!(f, "ldpc"),
        }
    }
}

/// A block could not be decoded: fewer usable symbols arrived than the
/// codec's structure requires. Always a recoverable, per-block condition
/// (spec.md §7, "Loss"); callers substitute silence, they never unwind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("FEC block not decodable from the symbols received")]
pub struct Insufficient;

/// Pure function over payload bytes: produces `r` repair payloads from
/// `k` source payloads. Does not own or mutate source packets, matching
/// spec.md §4.2's `encode(block: [Packet; K]) -> [RepairPayload; R]`.
/// Supplied by an external collaborator (spec.md §1); this crate ships
/// no implementation.
pub trait BlockEncoder: Send + Sync + fmt::Debug {
    fn encode(&self, source: &[Bytes]) -> Vec<Bytes>;
}

/// Pure function over payload bytes: attempts to recover all `k` source
/// payloads from whichever of the `k+r` symbols (source then repair, in
/// ESI order) are present. Matches spec.md §4.3's
/// `decode(block: [Option<Packet>; K+R]) -> Result<[Packet; K], Insufficient>`.
/// Supplied by an external collaborator (spec.md §1); this crate ships
/// no implementation.
pub trait BlockDecoder: Send + Sync + fmt::Debug {
    fn decode(&self, symbols: &[Option<Bytes>]) -> Result<Vec<Bytes>, Insufficient>;
}

/// An encoder/decoder pair for one (codec, K, R) combination, shared by
/// value (`Arc`) between the FEC writer and reader — both are pure over
/// payload bytes so a single instance is safe to use from either side
/// of a loopback test or a peer that both sends and relays. Constructed
/// by the embedder from a real external coder (or, in this crate's own
/// tests, from a minimal fixture — see `DESIGN.md`); this module never
/// builds one from a [`FecCodecKind`] alone.
#[derive(Clone)]
pub struct CodecPair {
    pub encoder: Arc<dyn BlockEncoder>,
    pub decoder: Arc<dyn BlockDecoder>,
}

impl fmt::Debug for CodecPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecPair").field("encoder", &self.encoder).finish()
    }
}

impl CodecPair {
    pub fn new(encoder: Arc<dyn BlockEncoder>, decoder: Arc<dyn BlockDecoder>) -> Self {
        Self { encoder, decoder }
    }

    pub fn scheme(kind: FecCodecKind) -> Option<crate::packet::FecScheme> {
        match kind {
            FecCodecKind::None => None,
            FecCodecKind::ReedSolomon8 => Some(crate::packet::FecScheme::ReedSolomon8),
            FecCodecKind::LdpcStaircase => Some(crate::packet::FecScheme::LdpcStaircase),
        }
    }
}

/// Fixtures standing in for the external FEC algebra collaborator in
/// this crate's own tests — the FEC-codec analogue of `testutil`'s
/// `VecSampleSource`/`VecSampleSink` standing in for sound I/O. A
/// single XOR parity equation, replicated across every repair slot:
/// recovers exactly one missing source symbol per block, reports
/// [`Insufficient`] for anything more. Not a general erasure code —
/// sufficient for the loss patterns this crate's own test suite
/// exercises, nothing more.
#[cfg(test)]
pub(crate) mod test_fixture {
    use super::{BlockDecoder, BlockEncoder, Insufficient};
    use bytes::Bytes;

    #[derive(Debug)]
    pub struct XorParity {
        pub r: usize,
    }

    impl BlockEncoder for XorParity {
        fn encode(&self, source: &[Bytes]) -> Vec<Bytes> {
            let len = source.iter().map(|b| b.len()).max().unwrap_or(0);
            let mut parity = vec![0u8; len];
            for s in source {
                for (p, b) in parity.iter_mut().zip(s.iter()) {
                    *p ^= b;
                }
            }
            vec![Bytes::from(parity); self.r]
        }
    }

    impl BlockDecoder for XorParity {
        fn decode(&self, symbols: &[Option<Bytes>]) -> Result<Vec<Bytes>, Insufficient> {
            let k = symbols.len() - self.r;
            let missing: Vec<usize> = (0..k).filter(|&i| symbols[i].is_none()).collect();
            if missing.len() > 1 {
                return Err(Insufficient);
            }

            let mut out: Vec<Bytes> =
                (0..k).map(|i| symbols[i].clone().unwrap_or_default()).collect();

            if let Some(&idx) = missing.first() {
                let repair = symbols[k..].iter().flatten().next().ok_or(Insufficient)?;
                let mut recovered = vec![0u8; repair.len()];
                recovered.copy_from_slice(repair);
                for (i, s) in out.iter().enumerate() {
                    if i == idx {
                        continue;
                    }
                    for (r, b) in recovered.iter_mut().zip(s.iter()) {
                        *r ^= b;
                    }
                }
                out[idx] = Bytes::from(recovered);
            }

            Ok(out)
        }
    }
}
