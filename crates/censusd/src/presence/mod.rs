//! Presence — announcing ourselves and forgetting peers who went quiet.

pub mod interfaces;
pub mod sweeper;
pub mod transmitter;

pub use sweeper::sweep_loop;
pub use transmitter::{transmit_loop, Targets};
