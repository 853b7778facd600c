//! newnym library crate
//!
//! Periodic Tor identity rotation over the ControlPort.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error taxonomy
//! - [`logging`] - tracing subscriber setup
//! - [`lookup`] - Public address lookup
//! - [`rotator`] - The rotate-and-report loop
//! - [`tor`] - Tor control port client
//! - [`util`] - Time formatting helpers

#![allow(clippy::doc_markdown)] // Doc formatting is secondary
#![allow(clippy::uninlined_format_args)] // Format string style preference
#![allow(clippy::missing_const_for_fn)] // Const fn optimization is low priority
#![allow(clippy::single_match_else)] // Match for clarity
#![allow(clippy::module_name_repetitions)] // TorController in tor is fine

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod rotator;
pub mod tor;
pub mod util;

pub use error::{Result, RotatorError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
