//! Scripted transport for deterministic testing of the session engine.
//!
//! The AARC protocol has no request/response pairing, so unlike a
//! lock-step mock this one is driven from the far end: a [`MockPeer`]
//! pushes inbound chunks (at whatever boundaries the test wants), closes or
//! fails the stream, and observes every command the engine transmits along
//! with the instant it was sent.
//!
//! # Example
//!
//! ```
//! use aarc_test_harness::MockTransport;
//!
//! let (transport, mut peer) = MockTransport::pair();
//! peer.push(b"OK\r");
//! peer.push(b"\n$RINGING_1");
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use aarc_core::error::{Error, Result};
use aarc_core::transport::Transport;

/// Something the peer injects into the inbound direction.
#[derive(Debug)]
enum Inbound {
    Data(Vec<u8>),
    Close,
    Fail(String),
}

/// One transmission observed by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    /// When `send()` was called (tokio clock, so paused-time tests work).
    pub at: Instant,
    /// The raw bytes written.
    pub bytes: Vec<u8>,
}

impl Sent {
    /// The transmitted command without its line terminator.
    pub fn command(&self) -> String {
        String::from_utf8_lossy(&self.bytes)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

/// Engine side of a scripted connection.
#[derive(Debug)]
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    /// Bytes from an inbound chunk that did not fit the caller's buffer.
    carry: Vec<u8>,
    sent: mpsc::UnboundedSender<Sent>,
    connected: bool,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

/// Test side of a scripted connection.
#[derive(Debug)]
pub struct MockPeer {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: mpsc::UnboundedReceiver<Sent>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a connected transport and the peer that drives it.
    pub fn pair() -> (MockTransport, MockPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let fail_sends = Arc::new(AtomicBool::new(false));

        let transport = MockTransport {
            inbound: in_rx,
            carry: Vec::new(),
            sent: sent_tx,
            connected: true,
            closed: Arc::clone(&closed),
            fail_sends: Arc::clone(&fail_sends),
        };
        let peer = MockPeer {
            inbound: in_tx,
            sent: sent_rx,
            closed,
            fail_sends,
        };
        (transport, peer)
    }

    fn deliver(&mut self, data: &[u8], buf: &mut [u8]) -> usize {
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        self.carry = data[n..].to_vec();
        n
    }
}

impl MockPeer {
    /// Deliver a raw chunk to the engine.
    pub fn push(&self, data: &[u8]) {
        let _ = self.inbound.send(Inbound::Data(data.to_vec()));
    }

    /// Deliver `line` followed by CR/LF.
    pub fn push_line(&self, line: &str) {
        self.push(format!("{line}\r\n").as_bytes());
    }

    /// Close the stream from the codec side.
    pub fn close(&self) {
        let _ = self.inbound.send(Inbound::Close);
    }

    /// Make the next `receive()` fail with a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self.inbound.send(Inbound::Fail(message.to_string()));
    }

    /// Make every subsequent `send()` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Wait for the next transmission. `None` once the transport is dropped.
    pub async fn next_sent(&mut self) -> Option<Sent> {
        self.sent.recv().await
    }

    /// Wait for the next transmission and return it as a command string.
    pub async fn next_command(&mut self) -> Option<String> {
        self.next_sent().await.map(|s| s.command())
    }

    /// Collect the next `n` transmitted commands.
    pub async fn commands(&mut self, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match self.next_command().await {
                Some(cmd) => out.push(cmd),
                None => break,
            }
        }
        out
    }

    /// Everything transmitted so far that has not been read yet.
    pub fn drain_sent(&mut self) -> Vec<Sent> {
        let mut out = Vec::new();
        while let Ok(sent) = self.sent.try_recv() {
            out.push(sent);
        }
        out
    }

    /// Whether the engine has closed its end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let _ = self.sent.send(Sent {
            at: Instant::now(),
            bytes: data.to_vec(),
        });
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transport("scripted send failure".into()));
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if !self.carry.is_empty() {
            let carry = std::mem::take(&mut self.carry);
            return Ok(self.deliver(&carry, buf));
        }

        match tokio::time::timeout(timeout, self.inbound.recv()).await {
            Ok(Some(Inbound::Data(data))) => Ok(self.deliver(&data, buf)),
            Ok(Some(Inbound::Close)) | Ok(None) => {
                self.connected = false;
                Err(Error::ConnectionLost)
            }
            Ok(Some(Inbound::Fail(message))) => Err(Error::Transport(message)),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
