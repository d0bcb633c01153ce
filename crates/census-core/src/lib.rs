//! census-core — shared types, wire format, identities, and configuration.
//! All other Census crates depend on this one.

pub mod config;
pub mod identity;
pub mod wire;

pub use config::CensusConfig;
pub use identity::Identity;
pub use wire::{Codec, Decoded, NodeId, Protocol, SwarmId, WireError};
