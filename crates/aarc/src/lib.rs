//! # aarc -- Control and telemetry client for AARC audio codecs
//!
//! `aarc` keeps a persistent session with an AARC-family broadcast audio
//! codec. It connects over TCP, authenticates, subscribes to call events,
//! polls device status and decodes level-meter telemetry into a live
//! snapshot that the rest of an application can read at any time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use aarc::{CallState, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::builder()
//!         .host("192.168.1.50")
//!         .password("secret")
//!         .build()?;
//!
//!     let codec = aarc::connect(config);
//!     let mut events = codec.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!         if codec.current_call_state() == CallState::Established {
//!             println!("on air");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate               | Purpose                                             |
//! |---------------------|-----------------------------------------------------|
//! | `aarc-core`         | Error type, transport traits, events, shared types  |
//! | `aarc-transport`    | TCP command channel and UDP telemetry socket        |
//! | `aarc-session`      | Framing, pacing, state machine, reconnect supervisor|
//! | **`aarc`**          | This facade crate -- re-exports everything          |
//!
//! ## Behavior
//!
//! - Commands are sent one at a time with at least 100 ms between them.
//!   Identical pending queries are collapsed.
//! - After any close or failure the supervisor waits 5 s and reconnects with
//!   a fresh session. Every parameter reads as unknown until re-reported.
//! - Reads on [`CodecHandle`] never block on the network.

pub use aarc_core::*;
pub use aarc_session::{
    CodecHandle, CommandKind, DEFAULT_PORT, OutboundCommand, ParamValue, SessionConfig,
    SessionConfigBuilder, SessionSnapshot, TelemetryConfig,
};

/// Protocol engine internals: framer, queue, interpreter and parameter
/// tables.
pub mod session {
    pub use aarc_session::*;
}

/// Transport traits and their TCP/UDP implementations.
pub mod transport {
    pub use aarc_core::transport::*;
    pub use aarc_transport::*;
}

/// Start a supervised session to the codec described by `config`, using a
/// TCP connection.
///
/// Must be called from within a tokio runtime. The returned handle is
/// usable immediately; connection progress is reported through
/// [`CodecHandle::phase`] and [`CodecHandle::subscribe`].
pub fn connect(config: SessionConfig) -> CodecHandle {
    aarc_session::spawn_supervisor(config, Box::new(aarc_transport::TcpConnector))
}

/// Start a supervised session with a caller-provided [`Connector`].
pub fn connect_with(config: SessionConfig, connector: Box<dyn Connector>) -> CodecHandle {
    aarc_session::spawn_supervisor(config, connector)
}
