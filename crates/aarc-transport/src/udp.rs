//! UDP socket for level-meter telemetry.
//!
//! The codec can push periodic audio-level datagrams to a configured
//! address. [`UdpTransport`] is the receiving end. It does not implement
//! [`Transport`](aarc_core::Transport): the channel is connectionless and
//! has no notion of open or closed.

use aarc_core::error::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// A bound UDP socket with error mapping consistent with [`TcpTransport`](crate::TcpTransport).
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local `host:port` (use port `0` for any free port).
    ///
    /// # Arguments
    ///
    /// * `addr` - A local `host:port` string (e.g. `"127.0.0.1:0"`)
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use aarc_transport::UdpTransport;
    /// # async fn example() -> aarc_core::Result<()> {
    /// let socket = UdpTransport::bind("127.0.0.1:0").await?;
    /// println!("listening on {}", socket.local_addr());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(Error::Io)?;
        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    /// Bind to `port` on all interfaces.
    ///
    /// This is how the session opens its telemetry receiver: the codec is
    /// told to report to this host on `port`, so the socket must accept
    /// datagrams on every interface.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use aarc_transport::UdpTransport;
    /// # use std::time::Duration;
    /// # async fn example() -> aarc_core::Result<()> {
    /// let socket = UdpTransport::bind_port(9000).await?;
    /// let mut buf = [0u8; 512];
    /// let (n, from) = socket.recv_from(&mut buf, Duration::from_secs(1)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port)).await
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Receive one datagram, waiting up to `timeout`.
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(
                    local = %self.local_addr,
                    error = %e,
                    "Failed to receive datagram"
                );
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}
