//! Configuration validation
//!
//! Fail-fast validation of configuration invariants.

use super::Config;
use crate::error::{Result, RotatorError};
use tracing::warn;

/// Tor ignores NEWNYM signals sent more often than this
const NEWNYM_RATE_LIMIT_SECS: u64 = 10;

/// Validate configuration invariants
pub fn validate(config: &Config) -> Result<()> {
    validate_tor(config)?;
    validate_rotation(config)?;
    validate_lookup(config)?;
    Ok(())
}

fn invalid(msg: impl Into<String>) -> RotatorError {
    RotatorError::Config(msg.into())
}

fn validate_tor(config: &Config) -> Result<()> {
    if config.tor.control_host.is_empty() {
        return Err(invalid("tor.control_host cannot be empty"));
    }
    if config.tor.control_port == 0 {
        return Err(invalid("tor.control_port cannot be 0"));
    }
    match &config.tor.control_password {
        None => {
            return Err(invalid(
                "no control password set (tor.control_password, TOR_CONTROL_PASSWORD or --password)",
            ))
        },
        Some(secret) if secret.is_empty() => {
            return Err(invalid("tor.control_password cannot be empty"));
        },
        Some(_) => {},
    }
    if config.lookup.via_tor && config.tor.socks_port == 0 {
        return Err(invalid("tor.socks_port cannot be 0 when lookup.via_tor is set"));
    }
    Ok(())
}

fn validate_rotation(config: &Config) -> Result<()> {
    if config.rotation.interval_secs == 0 {
        return Err(invalid("rotation.interval_secs must be positive"));
    }
    if config.rotation.interval_secs < NEWNYM_RATE_LIMIT_SECS {
        warn!(
            "rotation.interval_secs ({}) is below {}s; Tor rate-limits NEWNYM and may not build new circuits every cycle",
            config.rotation.interval_secs, NEWNYM_RATE_LIMIT_SECS
        );
    }
    Ok(())
}

fn validate_lookup(config: &Config) -> Result<()> {
    let url = reqwest::Url::parse(&config.lookup.url)
        .map_err(|e| invalid(format!("lookup.url is not a valid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!(
            "lookup.url must be http or https, got {}",
            url.scheme()
        )));
    }
    if config.lookup.timeout_secs == 0 {
        return Err(invalid("lookup.timeout_secs must be positive"));
    }
    Ok(())
}
