//! Tor Control Port client
//!
//! Communicates with the local Tor daemon via the control protocol.
//! Only the handful of commands identity rotation needs are implemented:
//! AUTHENTICATE, GETINFO, SIGNAL and QUIT.

use crate::config::{ControlSecret, TorConfig};
use crate::error::{Result, RotatorError};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

const STATUS_OK: u16 = 250;
const STATUS_AUTH_REQUIRED: u16 = 514;
const STATUS_AUTH_FAILED: u16 = 515;

/// A complete reply from the control port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code of the final line
    pub code: u16,
    /// Text of each reply line, status prefix stripped
    pub lines: Vec<String>,
    /// Contents of a `250+` data block, dot-unstuffed
    pub data: Vec<String>,
}

impl Reply {
    pub fn is_ok(&self) -> bool {
        self.code == STATUS_OK
    }

    /// Text of the final line
    pub fn message(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }

    fn summary(&self) -> String {
        format!("{} {}", self.code, self.message())
    }
}

/// Control channel operations the rotator depends on
#[allow(async_fn_in_trait)]
pub trait ControlChannel {
    /// Ask Tor to switch to clean circuits for new connections
    async fn signal_newnym(&mut self) -> Result<()>;

    /// Tear the channel down
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Connection to Tor control port
pub struct TorController {
    reader: BufReader<TcpStream>,
    addr: String,
    authenticated: bool,
}

impl TorController {
    /// Connect to the control port and authenticate with the configured password
    pub async fn connect(config: &TorConfig) -> Result<Self> {
        let secret = config
            .control_password
            .as_ref()
            .ok_or_else(|| RotatorError::Config("no control password configured".into()))?;

        let mut controller = Self::connect_unauthenticated(&config.control_addr()).await?;
        controller.authenticate(secret).await?;
        Ok(controller)
    }

    /// Open the TCP connection without authenticating
    pub async fn connect_unauthenticated(addr: &str) -> Result<Self> {
        debug!("Connecting to Tor control port: {}", addr);

        let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(RotatorError::Connection(format!(
                    "Failed to connect to Tor at {}: {}",
                    addr, e
                )))
            },
            Err(_) => {
                return Err(RotatorError::Connection(format!(
                    "Timed out connecting to Tor at {}",
                    addr
                )))
            },
        };

        Ok(Self {
            reader: BufReader::new(stream),
            addr: addr.to_string(),
            authenticated: false,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Authenticate with password (hex-encoded for HashedControlPassword)
    pub async fn authenticate(&mut self, secret: &ControlSecret) -> Result<()> {
        let password_hex = data_encoding::HEXLOWER.encode(secret.expose().as_bytes());
        let reply = self
            .command(&format!("AUTHENTICATE {}", password_hex))
            .await?;

        match reply.code {
            STATUS_OK => {
                self.authenticated = true;
                info!("Authenticated to Tor control port at {}", self.addr);
                Ok(())
            },
            STATUS_AUTH_FAILED => Err(RotatorError::Authentication(reply.summary())),
            _ => Err(RotatorError::ControlProtocol(format!(
                "AUTHENTICATE rejected: {}",
                reply.summary()
            ))),
        }
    }

    /// Get information about the Tor daemon
    pub async fn get_info(&mut self, keyword: &str) -> Result<String> {
        self.require_authenticated()?;
        let reply = self.command(&format!("GETINFO {}", keyword)).await?;
        let reply = ensure_ok(reply, "GETINFO")?;
        info_value(&reply, keyword).ok_or_else(|| {
            RotatorError::ControlProtocol(format!("GETINFO reply missing {}", keyword))
        })
    }

    /// Tor version string
    pub async fn version(&mut self) -> Result<String> {
        self.get_info("version").await
    }

    /// Send QUIT and drop the authenticated state
    pub async fn quit(&mut self) -> Result<()> {
        if !self.authenticated {
            return Ok(());
        }
        self.authenticated = false;
        let reply = self.command("QUIT").await?;
        debug!("Control connection closed: {}", reply.summary());
        Ok(())
    }

    fn require_authenticated(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(RotatorError::ControlProtocol(
                "control channel is not authenticated".into(),
            ))
        }
    }

    /// Send a command and read its reply
    async fn command(&mut self, cmd: &str) -> Result<Reply> {
        let preview = if cmd.starts_with("AUTHENTICATE") {
            "AUTHENTICATE ***"
        } else {
            cmd
        };
        debug!("Sending Tor command: {}", preview);

        if let Err(e) = self.write_line(cmd).await {
            return Err(RotatorError::Connection(format!(
                "Lost control connection to {}: {}",
                self.addr, e
            )));
        }

        let reply = read_reply(&mut self.reader).await?;
        debug!("Tor replied: {}", reply.summary());
        Ok(reply)
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await?;
        stream.flush().await
    }
}

impl ControlChannel for TorController {
    async fn signal_newnym(&mut self) -> Result<()> {
        self.require_authenticated()?;
        let reply = self.command("SIGNAL NEWNYM").await?;
        ensure_ok(reply, "SIGNAL NEWNYM")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.quit().await {
            warn!("Failed to close control connection cleanly: {}", e);
        }
        Ok(())
    }
}

fn ensure_ok(reply: Reply, what: &str) -> Result<Reply> {
    match reply.code {
        STATUS_OK => Ok(reply),
        STATUS_AUTH_REQUIRED => Err(RotatorError::ControlProtocol(format!(
            "{} refused, channel not authenticated: {}",
            what,
            reply.summary()
        ))),
        _ => Err(RotatorError::ControlProtocol(format!(
            "{} rejected: {}",
            what,
            reply.summary()
        ))),
    }
}

/// Extract the value for `keyword` from a GETINFO reply
fn info_value(reply: &Reply, keyword: &str) -> Option<String> {
    let prefix = format!("{}=", keyword);
    let line = reply.lines.iter().find(|l| l.starts_with(&prefix))?;
    let value = &line[prefix.len()..];
    if value.is_empty() && !reply.data.is_empty() {
        Some(reply.data.join("\n"))
    } else {
        Some(value.to_string())
    }
}

/// Read one complete reply
///
/// Format: `NNN-text` mid lines, `NNN+keyword=` followed by a data block
/// ending in a lone `.`, and a final `NNN text` line.
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = Vec::new();
    let mut data = Vec::new();
    let mut in_data_block = false;

    loop {
        let mut raw = String::new();
        let bytes_read = match timeout(REPLY_TIMEOUT, reader.read_line(&mut raw)).await {
            Ok(result) => result.map_err(|e| {
                RotatorError::Connection(format!("Failed reading from control port: {}", e))
            })?,
            Err(_) => {
                return Err(RotatorError::ControlProtocol(
                    "Timeout waiting for Tor response".into(),
                ))
            },
        };

        if bytes_read == 0 {
            return Err(RotatorError::Connection(
                "Tor closed the control connection".into(),
            ));
        }

        let line = raw.trim_end_matches(['\r', '\n']);

        if in_data_block {
            if line == "." {
                in_data_block = false;
            } else if let Some(unstuffed) = line.strip_prefix('.') {
                data.push(unstuffed.to_string());
            } else {
                data.push(line.to_string());
            }
            continue;
        }

        let code = line
            .get(..3)
            .and_then(|c| c.parse::<u16>().ok())
            .ok_or_else(|| malformed(line))?;
        let text = line.get(4..).unwrap_or("").to_string();

        match line.as_bytes().get(3) {
            Some(b' ') => {
                lines.push(text);
                return Ok(Reply { code, lines, data });
            },
            Some(b'-') => lines.push(text),
            Some(b'+') => {
                lines.push(text);
                in_data_block = true;
            },
            _ => return Err(malformed(line)),
        }
    }
}

fn malformed(line: &str) -> RotatorError {
    RotatorError::ControlProtocol(format!("Malformed reply line: {:?}", line))
}
