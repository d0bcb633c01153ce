//! census-services — shared state between the Census daemon's tasks.

pub mod registry;

pub use registry::{interval_for, Beacon, NodeCount, NodeRegistry, PeerView, Sighting};
