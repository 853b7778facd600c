//! Configuration loading and validation
//!
//! Layered configuration: built-in defaults, then an optional TOML file,
//! then environment and command-line overrides (applied by [`crate::cli`]).
//! No runtime mutation - configuration is immutable once the loop starts.

pub mod file;
mod validation;

pub use file::{load, load_from_path};
pub use validation::validate;

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tor: TorConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
}

/// Tor daemon connection
#[derive(Debug, Clone, Deserialize)]
pub struct TorConfig {
    #[serde(default = "default_control_host")]
    pub control_host: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    /// Plaintext password matching Tor's HashedControlPassword
    pub control_password: Option<ControlSecret>,
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,
}

impl TorConfig {
    /// `host:port` of the control port
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.control_host, self.control_port)
    }

    /// SOCKS proxy URL with remote DNS resolution
    pub fn socks_url(&self) -> String {
        format!("socks5h://{}:{}", self.control_host, self.socks_port)
    }
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            control_host: default_control_host(),
            control_port: default_control_port(),
            control_password: None,
            socks_port: default_socks_port(),
        }
    }
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}
fn default_control_port() -> u16 {
    9051
}
fn default_socks_port() -> u16 {
    9050
}

/// Rotation loop timing
#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    /// Seconds between rotations
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Seconds to wait after NEWNYM before looking up the new address
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
    /// Stop after this many cycles (0 or absent = run until interrupted)
    #[serde(default)]
    pub count: Option<u64>,
    /// Print a countdown ticker while waiting for the next rotation
    #[serde(default)]
    pub countdown: bool,
}

impl RotationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// Number of cycles to run, `None` for unbounded
    pub fn cycle_limit(&self) -> Option<u64> {
        self.count.filter(|&n| n > 0)
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            settle_secs: default_settle(),
            count: None,
            countdown: false,
        }
    }
}

fn default_interval() -> u64 {
    60
}
fn default_settle() -> u64 {
    5
}

/// Public address lookup service
#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "default_lookup_url")]
    pub url: String,
    /// Route lookups through the Tor SOCKS port
    #[serde(default = "default_via_tor")]
    pub via_tor: bool,
    #[serde(default = "default_lookup_timeout")]
    pub timeout_secs: u64,
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url: default_lookup_url(),
            via_tor: default_via_tor(),
            timeout_secs: default_lookup_timeout(),
        }
    }
}

fn default_lookup_url() -> String {
    "https://checkip.amazonaws.com".to_string()
}
fn default_via_tor() -> bool {
    true
}
fn default_lookup_timeout() -> u64 {
    10
}

/// Control port password
///
/// Never printed; wiped from memory on drop.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ControlSecret(String);

impl ControlSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ControlSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ControlSecret(***)")
    }
}
