//! Transport implementations for the AARC client.
//!
//! - [`TcpTransport`] / [`TcpConnector`]: the persistent command channel
//! - [`UdpTransport`]: the connectionless level-meter telemetry channel

pub mod tcp;
pub mod udp;

pub use tcp::{TcpConnector, TcpTransport};
pub use udp::UdpTransport;
