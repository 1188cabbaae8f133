//! TCP transport for the AARC command channel.
//!
//! The codec listens for a single persistent TCP connection carrying
//! CR/LF-terminated AT commands. [`TcpTransport`] implements [`Transport`]
//! over that socket and [`TcpConnector`] produces a fresh one for every
//! connection attempt made by the reconnect supervisor.
//!
//! # Example
//!
//! ```no_run
//! use aarc_transport::TcpTransport;
//! use aarc_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> aarc_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.1.50:2000").await?;
//! transport.send(b"ATI\r\n").await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

use aarc_core::error::{Error, Result};
use aarc_core::transport::{Connector, Transport};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport to a codec's AARC port.
#[derive(Debug)]
pub struct TcpTransport {
    /// The underlying TCP stream, `None` after `close()` is called.
    stream: Option<TcpStream>,
    /// The address string for logging.
    addr: String,
}

impl TcpTransport {
    /// Connect to `host:port` using the default timeout.
    ///
    /// The codec's control port is 2000 unless it was reconfigured.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use aarc_transport::TcpTransport;
    /// # async fn example() -> aarc_core::Result<()> {
    /// let transport = TcpTransport::connect("192.168.1.50:2000").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to `host:port`, giving up after `timeout`.
    ///
    /// # Arguments
    ///
    /// * `addr` - A `host:port` string (e.g. `"192.168.1.50:2000"`)
    /// * `timeout` - How long to wait for the handshake before returning
    ///   [`Error::Timeout`]
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use aarc_transport::TcpTransport;
    /// # use std::time::Duration;
    /// # async fn example() -> aarc_core::Result<()> {
    /// let transport = TcpTransport::connect_with_timeout(
    ///     "codec.studio.lan:2000",
    ///     Duration::from_secs(2),
    /// ).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to codec"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "TCP connection failed");
                map_connect_error(e, addr)
            })?;

        // Commands are tiny; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %addr, "TCP connection established");

        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let text = String::from_utf8_lossy(data);
        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = %text.escape_debug(),
            "Sending data"
        );

        stream.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send data");
            map_io_error(e)
        })?;

        stream.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush TCP stream");
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) => {
                tracing::warn!(addr = %self.addr, "Peer closed connection (0 bytes read)");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                tracing::trace!(
                    addr = %self.addr,
                    bytes = n,
                    data = %text.escape_debug(),
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(addr = %self.addr, "Closing TCP connection");

            if let Err(e) = stream.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shut down TCP stream (continuing anyway)"
                );
            }

            tracing::info!(addr = %self.addr, "TCP connection closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// [`Connector`] that opens a [`TcpTransport`] per attempt.
///
/// This is what the reconnect supervisor uses against real hardware. Each
/// call dials `host:port` afresh, so a dropped link never reuses a stale
/// socket.
///
/// # Example
///
/// ```no_run
/// # use aarc_transport::TcpConnector;
/// # use aarc_core::transport::Connector;
/// # use std::time::Duration;
/// # async fn example() -> aarc_core::Result<()> {
/// let mut transport = TcpConnector
///     .connect("192.168.1.50", 2000, Duration::from_secs(5))
///     .await?;
/// transport.send(b"ATI\r\n").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Box<dyn Transport>> {
        let addr = format!("{host}:{port}");
        let transport = TcpTransport::connect_with_timeout(&addr, timeout).await?;
        Ok(Box::new(transport))
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
