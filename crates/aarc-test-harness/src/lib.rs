//! aarc-test-harness: Scripted transports and a mock codec for testing
//! the AARC session engine.
//!
//! - [`MockTransport`] / [`MockPeer`]: an in-memory transport driven from
//!   the codec side, for deterministic (paused-clock) engine tests
//! - [`MockConnector`]: scripted connection outcomes for the reconnect
//!   supervisor
//! - [`MockCodecServer`]: a loopback TCP peer with line-based expectations

pub mod mock_connector;
pub mod mock_tcp;
pub mod mock_transport;

pub use mock_connector::MockConnector;
pub use mock_tcp::MockCodecServer;
pub use mock_transport::{MockPeer, MockTransport, Sent};
