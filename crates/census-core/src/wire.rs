//! Census wire format — the beacon datagram payload.
//!
//! Two mutually exclusive protocol modes share one port:
//!
//!   binary: SwarmId (32 bytes) || NodeId (32 bytes), no delimiter
//!   text:   "<32 alphanumeric chars>:"
//!
//! The binary frame is #[repr(C, packed)] with zerocopy derives, so encoding
//! and decoding are allocation-free and there is no unsafe code here.

use std::sync::LazyLock;

use bytes::Bytes;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Identities ────────────────────────────────────────────────────────────────

pub const SWARM_ID_LEN: usize = 32;
pub const NODE_ID_LEN: usize = 32;

/// Length of a text-mode identity. Equal to NODE_ID_LEN so both modes
/// share the NodeId type.
pub const TEXT_ID_LEN: usize = 32;

/// Identifies the swarm a node belongs to. BLAKE3 of the group name.
pub type SwarmId = [u8; SWARM_ID_LEN];

/// Identifies one peer within a swarm. Equality is byte-exact.
pub type NodeId = [u8; NODE_ID_LEN];

// ── Binary frame ──────────────────────────────────────────────────────────────

/// Binary beacon frame.
///
/// Wire size: 64 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct BeaconFrame {
    /// Swarm the sender belongs to. Receivers in another swarm ignore the frame.
    pub swarm_id: SwarmId,
    /// Sender identity.
    pub node_id: NodeId,
}

assert_eq_size!(BeaconFrame, [u8; 64]);

pub const FRAME_LEN: usize = std::mem::size_of::<BeaconFrame>();

// ── Constants ─────────────────────────────────────────────────────────────────

/// Default UDP port for beacons.
pub const DEFAULT_PORT: u16 = 19091;

/// Beacon interval per known peer. The transmitter waits
/// BASE_INTERVAL * (count + 1) between beacons.
pub const BASE_INTERVAL_SECS: u64 = 1;

/// Extra seconds added to the history length when computing the
/// staleness threshold.
pub const STALENESS_GRACE_SECS: u64 = 5;

/// Receive buffer size. Anything longer is truncated by the kernel and
/// then rejected as malformed.
pub const MAX_DATAGRAM: usize = 4096;

static TEXT_BEACON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]{32}:$").expect("text beacon pattern is valid")
});

// ── Protocol ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Swarm-aware fixed-length frames.
    #[default]
    Binary,
    /// Legacy "<id>:" beacons with no swarm separation.
    Text,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Binary => f.write_str("binary"),
            Protocol::Text => f.write_str("text"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Protocol::Binary),
            "text" => Ok(Protocol::Text),
            other => Err(WireError::UnknownProtocol(other.to_string())),
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Outcome of decoding a well-formed datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A beacon from another member of our swarm.
    Peer(NodeId),
    /// A beacon from a different swarm. Not an error.
    ForeignSwarm,
    /// Our own beacon, looped back by the broadcast domain. Not an error.
    SelfEcho,
}

/// Encodes this node's beacon and decodes beacons from others.
#[derive(Debug, Clone)]
pub struct Codec {
    protocol: Protocol,
    swarm_id: SwarmId,
    node_id: NodeId,
}

impl Codec {
    pub fn new(protocol: Protocol, swarm_id: SwarmId, node_id: NodeId) -> Self {
        Self {
            protocol,
            swarm_id,
            node_id,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// The payload this node broadcasts every beacon interval.
    pub fn encode(&self) -> Bytes {
        match self.protocol {
            Protocol::Binary => {
                let frame = BeaconFrame {
                    swarm_id: self.swarm_id,
                    node_id: self.node_id,
                };
                Bytes::copy_from_slice(frame.as_bytes())
            }
            Protocol::Text => {
                let mut out = Vec::with_capacity(TEXT_ID_LEN + 1);
                out.extend_from_slice(&self.node_id);
                out.push(b':');
                Bytes::from(out)
            }
        }
    }

    /// Extract the sender identity from a raw datagram payload.
    pub fn decode(&self, payload: &[u8]) -> Result<Decoded, WireError> {
        let sender = match self.protocol {
            Protocol::Binary => {
                let frame = BeaconFrame::read_from(payload).ok_or(WireError::BadLength {
                    expected: FRAME_LEN,
                    actual: payload.len(),
                })?;
                if frame.swarm_id != self.swarm_id {
                    return Ok(Decoded::ForeignSwarm);
                }
                frame.node_id
            }
            Protocol::Text => {
                if !TEXT_BEACON.is_match(payload) {
                    return Err(WireError::BadTextForm);
                }
                let mut id = [0u8; NODE_ID_LEN];
                id.copy_from_slice(&payload[..TEXT_ID_LEN]);
                id
            }
        };

        if sender == self.node_id {
            return Ok(Decoded::SelfEcho);
        }
        Ok(Decoded::Peer(sender))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed beacon: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },

    #[error("malformed beacon: expected 32 alphanumeric characters followed by a colon")]
    BadTextForm,

    #[error("unknown protocol {0:?} (expected \"binary\" or \"text\")")]
    UnknownProtocol(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
