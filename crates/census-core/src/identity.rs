//! Node and swarm identities.
//!
//! Provides three things:
//!   1. BLAKE3 hashing — swarm ids from group names, node ids from seeds
//!   2. Random alphanumeric identities from the OS CSPRNG
//!   3. Resolution of this node's identity from configuration
//!
//! Randomness failures are surfaced as errors. A node that cannot establish
//! an identity must not start beaconing.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::config::CensusConfig;
use crate::wire::{NodeId, Protocol, SwarmId, NODE_ID_LEN, TEXT_ID_LEN};

const ALPHANUMERIC: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ── Hashing ───────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Derive the swarm id for a group name.
pub fn swarm_id(group: &str) -> Result<SwarmId, IdentityError> {
    if group.trim().is_empty() {
        return Err(IdentityError::EmptyGroup);
    }
    Ok(hash(group.as_bytes()))
}

/// Derive a stable node id from a seed such as a hostname.
pub fn node_id_from_seed(seed: &str) -> NodeId {
    hash(seed.as_bytes())
}

// ── Randomness ────────────────────────────────────────────────────────────────

/// Generate a random alphanumeric string of `len` characters.
///
/// Bytes are masked to 6 bits and values past the alphabet are rejected,
/// so every character is equally likely.
pub fn random_alnum(len: usize) -> Result<String, IdentityError> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while out.len() < len {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(IdentityError::Randomness)?;
        for b in buf {
            let idx = (b & 0x3f) as usize;
            if idx < ALPHANUMERIC.len() {
                out.push(ALPHANUMERIC[idx] as char);
                if out.len() == len {
                    break;
                }
            }
        }
    }
    Ok(out)
}

/// A fresh random node id. Alphanumeric, so it is valid in both protocols.
pub fn random_node_id() -> Result<NodeId, IdentityError> {
    let s = random_alnum(NODE_ID_LEN)?;
    let mut id = [0u8; NODE_ID_LEN];
    id.copy_from_slice(s.as_bytes());
    Ok(id)
}

/// Validate a configured text-mode id: exactly 32 ASCII alphanumerics.
pub fn text_node_id(s: &str) -> Result<NodeId, IdentityError> {
    if s.len() != TEXT_ID_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(IdentityError::BadTextId(s.to_string()));
    }
    let mut id = [0u8; NODE_ID_LEN];
    id.copy_from_slice(s.as_bytes());
    Ok(id)
}

// ── Display ───────────────────────────────────────────────────────────────────

/// Render a node id for logs and the status API.
/// Alphanumeric ids print as-is, hashed ids as hex.
pub fn display_id(id: &NodeId) -> String {
    if id.iter().all(u8::is_ascii_alphanumeric) {
        String::from_utf8_lossy(id).into_owned()
    } else {
        hex::encode(id)
    }
}

/// Short form of `display_id` for log fields.
pub fn short_id(id: &NodeId) -> String {
    let mut s = display_id(id);
    s.truncate(8);
    s
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// This node's identity within its swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub protocol: Protocol,
    pub swarm_id: SwarmId,
    pub node_id: NodeId,
}

impl Identity {
    /// Resolve identity from config.
    ///
    /// Binary mode: configured node_id is hashed; otherwise the hostname
    /// (if enabled and provided) is hashed; otherwise a random id is used.
    /// Text mode: configured node_id must already be 32 alphanumerics;
    /// otherwise a random id is used. The swarm id is unused on the wire
    /// in text mode but still derived when a group is set.
    pub fn resolve(config: &CensusConfig, hostname: Option<&str>) -> Result<Self, IdentityError> {
        let protocol = config.swarm.protocol;
        let configured = config.identity.node_id.trim();

        let (swarm_id, node_id) = match protocol {
            Protocol::Binary => {
                let swarm_id = swarm_id(&config.swarm.group)?;
                let node_id = if !configured.is_empty() {
                    node_id_from_seed(configured)
                } else if let (true, Some(host)) = (config.identity.use_hostname, hostname) {
                    node_id_from_seed(host)
                } else {
                    random_node_id()?
                };
                (swarm_id, node_id)
            }
            Protocol::Text => {
                let swarm_id = swarm_id(&config.swarm.group).unwrap_or([0u8; 32]);
                let node_id = if configured.is_empty() {
                    random_node_id()?
                } else {
                    text_node_id(configured)?
                };
                (swarm_id, node_id)
            }
        };

        Ok(Self {
            protocol,
            swarm_id,
            node_id,
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("swarm group name must not be empty")]
    EmptyGroup,
    #[error("text-mode node id must be 32 alphanumeric characters, got {0:?}")]
    BadTextId(String),
    #[error("secure randomness unavailable: {0}")]
    Randomness(rand::Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_alnum_has_requested_length_and_alphabet() {
        for len in [0, 1, 32, 100] {
            let s = random_alnum(len).unwrap();
            assert_eq!(s.len(), len);
            assert!(s.bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn random_ids_differ() {
        let a = random_node_id().unwrap();
        let b = random_node_id().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn swarm_id_is_deterministic_and_group_scoped() {
        assert_eq!(swarm_id("lab").unwrap(), swarm_id("lab").unwrap());
        assert_ne!(swarm_id("lab").unwrap(), swarm_id("prod").unwrap());
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(swarm_id(""), Err(IdentityError::EmptyGroup)));
        assert!(matches!(swarm_id("   "), Err(IdentityError::EmptyGroup)));
    }

    #[test]
    fn text_node_id_validation() {
        assert!(text_node_id("AbC123dEf456GhI789jKl012MnO345pQ").is_ok());
        assert!(text_node_id("short").is_err());
        assert!(text_node_id("AbC123dEf456GhI789jKl012MnO345p!").is_err());
    }

    #[test]
    fn display_id_switches_on_alphabet() {
        let text = *b"AbC123dEf456GhI789jKl012MnO345pQ";
        assert_eq!(display_id(&text), "AbC123dEf456GhI789jKl012MnO345pQ");
        assert_eq!(short_id(&text), "AbC123dE");
        assert_eq!(display_id(&[0xff; 32]), "ff".repeat(32));
    }

    #[test]
    fn resolve_binary_prefers_configured_then_hostname() {
        let mut config = CensusConfig::default();
        config.identity.node_id = "node-7".to_string();
        let id = Identity::resolve(&config, Some("host-a")).unwrap();
        assert_eq!(id.node_id, node_id_from_seed("node-7"));
        assert_eq!(id.swarm_id, swarm_id(&config.swarm.group).unwrap());

        config.identity.node_id.clear();
        config.identity.use_hostname = true;
        let id = Identity::resolve(&config, Some("host-a")).unwrap();
        assert_eq!(id.node_id, node_id_from_seed("host-a"));

        config.identity.use_hostname = false;
        let id = Identity::resolve(&config, Some("host-a")).unwrap();
        assert_ne!(id.node_id, node_id_from_seed("host-a"));
    }

    #[test]
    fn resolve_binary_requires_group() {
        let mut config = CensusConfig::default();
        config.swarm.group.clear();
        assert!(matches!(
            Identity::resolve(&config, None),
            Err(IdentityError::EmptyGroup)
        ));
    }

    #[test]
    fn resolve_text_accepts_empty_group() {
        let mut config = CensusConfig::default();
        config.swarm.protocol = Protocol::Text;
        config.swarm.group.clear();
        let id = Identity::resolve(&config, None).unwrap();
        assert!(id.node_id.iter().all(u8::is_ascii_alphanumeric));

        config.identity.node_id = "not valid".to_string();
        assert!(matches!(
            Identity::resolve(&config, None),
            Err(IdentityError::BadTextId(_))
        ));
    }
}
