//! In-process stand-in for the Tor ControlPort

#![allow(dead_code)]

use newnym::config::{ControlSecret, TorConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub const TOR_VERSION: &str = "0.4.8.12";

/// Handle to a running fake control port
pub struct MockTor {
    pub port: u16,
    signals: Arc<AtomicUsize>,
    quits: Arc<AtomicUsize>,
}

impl MockTor {
    /// Start a control port that accepts `password` and answers NEWNYM with
    /// `514` once `accept_signals` signals have been taken
    pub async fn start(password: &'static str, accept_signals: Option<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let signals = Arc::new(AtomicUsize::new(0));
        let quits = Arc::new(AtomicUsize::new(0));
        let (signal_counter, quit_counter) = (Arc::clone(&signals), Arc::clone(&quits));

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    password,
                    accept_signals,
                    Arc::clone(&signal_counter),
                    Arc::clone(&quit_counter),
                ));
            }
        });

        Self {
            port,
            signals,
            quits,
        }
    }

    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }

    /// QUIT commands received, counted before the reply is sent
    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    pub fn config(&self, password: &str) -> TorConfig {
        TorConfig {
            control_host: "127.0.0.1".into(),
            control_port: self.port,
            control_password: Some(ControlSecret::new(password)),
            socks_port: 9050,
        }
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    password: &'static str,
    accept_signals: Option<usize>,
    signals: Arc<AtomicUsize>,
    quits: Arc<AtomicUsize>,
) {
    let expected = format!(
        "AUTHENTICATE {}",
        data_encoding::HEXLOWER.encode(password.as_bytes())
    );
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    let mut authenticated = false;

    while let Ok(Some(line)) = lines.next_line().await {
        if line == "QUIT" {
            quits.fetch_add(1, Ordering::SeqCst);
            let _ = write.write_all(b"250 closing connection\r\n").await;
            return;
        }

        let reply = if line.starts_with("AUTHENTICATE") {
            if line == expected {
                authenticated = true;
                "250 OK\r\n".to_string()
            } else {
                "515 Authentication failed: Password did not match HashedControlPassword value from configuration\r\n".to_string()
            }
        } else if !authenticated {
            "514 Authentication required.\r\n".to_string()
        } else if line == "GETINFO version" {
            format!("250-version={}\r\n250 OK\r\n", TOR_VERSION)
        } else if line == "SIGNAL NEWNYM" {
            let taken = signals.load(Ordering::SeqCst);
            if accept_signals.is_some_and(|limit| taken >= limit) {
                authenticated = false;
                "514 Authentication required.\r\n".to_string()
            } else {
                signals.fetch_add(1, Ordering::SeqCst);
                "250 OK\r\n".to_string()
            }
        } else {
            format!("510 Unrecognized command \"{}\"\r\n", line)
        };

        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// A port nothing is listening on
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
