//! Transport traits for the codec command channel.
//!
//! The [`Transport`] trait abstracts over the byte stream to the codec. The
//! production implementation is a TCP socket; tests use the scripted
//! `MockTransport` from `aarc-test-harness`.
//!
//! [`Connector`] produces a fresh transport per connection attempt. The
//! reconnect supervisor owns one connector for its whole lifetime and never
//! reuses a transport across attempts.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a codec.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the codec.
    ///
    /// Completes once the bytes have been handed to the socket. This is a
    /// write acknowledgement, not a protocol-level reply.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the codec into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout`; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrived
    /// and [`Error::ConnectionLost`](crate::error::Error::ConnectionLost)
    /// when the peer closed the stream.
    ///
    /// Implementations must be cancel-safe: dropping the future before it
    /// completes must not lose bytes.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected). Closing
    /// twice is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Factory for fresh transports, one per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport to `host:port`, giving up after `timeout`.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>>;
}
