//! Command-line interface for newnym
//!
//! A single launch command; every flag is optional and overrides the
//! matching configuration file value.

use crate::config::{Config, ControlSecret};
use clap::Parser;
use std::path::PathBuf;

/// newnym - periodically rotate the Tor exit identity
#[derive(Parser, Debug)]
#[command(name = "newnym")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Tor control host
    #[arg(long)]
    pub control_host: Option<String>,

    /// Tor control port
    #[arg(long)]
    pub control_port: Option<u16>,

    /// Tor control password (plaintext of HashedControlPassword)
    #[arg(long, env = "TOR_CONTROL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Seconds between rotations
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Seconds to wait after NEWNYM before checking the address
    #[arg(long)]
    pub wait_after_change: Option<u64>,

    /// Number of rotations before exiting (0 = until interrupted)
    #[arg(long)]
    pub count: Option<u64>,

    /// Perform one rotation and exit
    #[arg(long, conflicts_with = "count", default_value_t = false)]
    pub run_once: bool,

    /// Show a countdown until the next rotation
    #[arg(long, default_value_t = false)]
    pub countdown: bool,

    /// Address lookup URL
    #[arg(long)]
    pub lookup_url: Option<String>,

    /// Query the lookup service directly instead of through Tor
    #[arg(long, default_value_t = false)]
    pub direct_lookup: bool,
}

impl Cli {
    /// Overlay command-line values onto a loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.control_host {
            config.tor.control_host = host.clone();
        }
        if let Some(port) = self.control_port {
            config.tor.control_port = port;
        }
        if let Some(password) = &self.password {
            config.tor.control_password = Some(ControlSecret::new(password.as_str()));
        }
        if let Some(interval) = self.interval {
            config.rotation.interval_secs = interval;
        }
        if let Some(settle) = self.wait_after_change {
            config.rotation.settle_secs = settle;
        }
        if let Some(count) = self.count {
            config.rotation.count = Some(count);
        }
        if self.run_once {
            config.rotation.count = Some(1);
        }
        if self.countdown {
            config.rotation.countdown = true;
        }
        if let Some(url) = &self.lookup_url {
            config.lookup.url = url.clone();
        }
        if self.direct_lookup {
            config.lookup.via_tor = false;
        }
    }
}

/// Parse command line arguments
pub fn parse() -> Cli {
    Cli::parse()
}
