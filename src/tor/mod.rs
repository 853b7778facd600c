//! Tor daemon interaction
//!
//! Handles Tor ControlPort communication. Tor is treated as a black box.

pub mod control;

pub use control::{ControlChannel, Reply, TorController};
