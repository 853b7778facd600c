//! Public address lookup
//!
//! Asks an external HTTP(S) service which address our traffic appears to
//! come from. Lookups go through Tor's SOCKS port by default so the answer
//! reflects the current exit relay.

use crate::config::{LookupConfig, TorConfig};
use crate::error::{Result, RotatorError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Fields checked, in order, when the service answers with JSON
const JSON_ADDRESS_FIELDS: &[&str] = &["ip", "address", "origin"];

/// Source of public address readings
#[allow(async_fn_in_trait)]
pub trait AddressLookup {
    /// Current apparent public address
    async fn lookup(&self) -> Result<String>;
}

/// One public address reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// `None` when the lookup failed
    pub address: Option<String>,
    pub at: DateTime<Utc>,
}

impl Observation {
    /// Take a reading, degrading recoverable failures to an unknown address
    pub async fn take<L: AddressLookup>(lookup: &L) -> Result<Self> {
        let address = match lookup.lookup().await {
            Ok(address) => Some(address),
            Err(e) if e.is_recoverable() => {
                warn!("{}; reporting address as unknown", e);
                None
            },
            Err(e) => return Err(e),
        };
        Ok(Self {
            address,
            at: Utc::now(),
        })
    }

    pub fn is_known(&self) -> bool {
        self.address.is_some()
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address.as_deref().unwrap_or("unknown"))
    }
}

/// Lookup over HTTP(S) with reqwest
pub struct HttpLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpLookup {
    pub fn new(config: &LookupConfig, tor: &TorConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout());

        if config.via_tor {
            let socks_url = tor.socks_url();
            let proxy = reqwest::Proxy::all(&socks_url).map_err(|e| {
                RotatorError::Config(format!("Invalid SOCKS proxy {}: {}", socks_url, e))
            })?;
            builder = builder.proxy(proxy);
            debug!("Address lookups routed via {}", socks_url);
        } else {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| RotatorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AddressLookup for HttpLookup {
    async fn lookup(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RotatorError::Lookup(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RotatorError::Lookup(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RotatorError::Lookup(format!("{}: {}", self.url, e)))?;

        parse_address(&body)
    }
}

/// Extract an IP address from a plain-text or JSON response body
pub fn parse_address(body: &str) -> Result<String> {
    let body = body.trim();

    let candidate = if body.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| RotatorError::Lookup(format!("Invalid JSON response: {}", e)))?;
        JSON_ADDRESS_FIELDS
            .iter()
            .find_map(|field| value.get(field).and_then(|v| v.as_str()))
            .map(str::to_string)
            .ok_or_else(|| RotatorError::Lookup("JSON response has no address field".into()))?
    } else {
        body.to_string()
    };

    // httpbin-style "origin" may list proxy hops; the first is the client
    let candidate = candidate.split(',').next().unwrap_or("").trim();

    candidate
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| {
            let preview: String = candidate.chars().take(64).collect();
            RotatorError::Lookup(format!("Response is not an IP address: {:?}", preview))
        })
}
