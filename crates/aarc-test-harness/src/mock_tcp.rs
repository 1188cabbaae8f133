//! Mock codec listening on a loopback TCP port.
//!
//! [`MockCodecServer`] accepts a single connection and plays back scripted
//! replies. AARC replies are not correlated with requests and the engine
//! sends an initialization burst the test rarely cares about in full, so
//! expectations are matched loosely: each received command line is compared
//! with the *next* expectation, and lines that do not match are recorded
//! but otherwise ignored.
//!
//! # Example
//!
//! ```
//! use aarc_test_harness::MockCodecServer;
//!
//! # async fn example() -> aarc_core::Result<()> {
//! let mut server = MockCodecServer::new().await?;
//! server.expect("ATI", "SCOOP 5 IP\r\nOK\r\n");
//! server.expect("AT&V", "#COD1=7\r\nOK\r\n");
//! server.start();
//!
//! let port = server.port();
//! // ... connect the engine to 127.0.0.1:port ...
//! # Ok(())
//! # }
//! ```

use aarc_core::error::{Error, Result};
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A command the server waits for and the raw reply it sends back.
#[derive(Debug, Clone)]
struct LineExpectation {
    command: String,
    reply: Vec<u8>,
}

/// A scripted codec for end-to-end tests over a real socket.
pub struct MockCodecServer {
    listener: Option<TcpListener>,
    port: u16,
    greeting: Vec<u8>,
    expectations: VecDeque<LineExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<Vec<String>, String>>>,
}

impl MockCodecServer {
    /// Bind to a random loopback port. Nothing is accepted until
    /// [`start`](MockCodecServer::start).
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock codec: {}", e)))?;
        let port = listener.local_addr().map_err(Error::Io)?.port();

        Ok(Self {
            listener: Some(listener),
            port,
            greeting: Vec::new(),
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Bytes written as soon as the client connects, before any command.
    pub fn greet(&mut self, bytes: &[u8]) {
        self.greeting = bytes.to_vec();
    }

    /// When the client sends the line `command`, reply with `reply`.
    pub fn expect(&mut self, command: &str, reply: &str) {
        self.expectations.push_back(LineExpectation {
            command: command.to_string(),
            reply: reply.as_bytes().to_vec(),
        });
    }

    /// The loopback port the server listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Spawn the server task.
    ///
    /// The task accepts one client, sends the greeting, works through the
    /// expectations, then keeps recording commands until the client closes.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let greeting = std::mem::take(&mut self.greeting);
        let mut expectations: VecDeque<LineExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {}", e))?;
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();

            if !greeting.is_empty() {
                write_half
                    .write_all(&greeting)
                    .await
                    .map_err(|e| format!("greeting write error: {}", e))?;
            }

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        // A reset from the client counts as a close.
                        tracing::debug!(error = %e, "Mock codec read ended");
                        break;
                    }
                };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                received.push(line.clone());

                let matches = expectations
                    .front()
                    .is_some_and(|next| next.command == line);
                if matches {
                    if let Some(expectation) = expectations.pop_front() {
                        write_half
                            .write_all(&expectation.reply)
                            .await
                            .map_err(|e| format!("reply to {:?}: write error: {}", line, e))?;
                        write_half
                            .flush()
                            .await
                            .map_err(|e| format!("reply to {:?}: flush error: {}", line, e))?;
                    }
                }
            }

            match expectations.front() {
                Some(missing) => Err(format!(
                    "client closed before sending {:?} (received {:?})",
                    missing.command, received
                )),
                None => Ok(received),
            }
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the client to close and return every command line it sent.
    ///
    /// Fails if an expectation was never met.
    pub async fn wait(self) -> std::result::Result<Vec<String>, String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {}", e))?,
            None => Ok(Vec::new()),
        }
    }
}
