//! Protocol engine for AARC audio codecs.
//!
//! The codec speaks a line-oriented ASCII command protocol over TCP and can
//! push level-meter datagrams over UDP. This crate turns that stream into
//! observable state: connection phase, call state, a decoded parameter
//! table and audio levels.
//!
//! # Architecture
//!
//! - [`framer`] -- splits the byte stream into lines and call markers
//! - [`queue`] -- paced outbound FIFO with query deduplication
//! - [`interpreter`] -- classifies one framed message
//! - [`params`] -- parameter table and value decoders
//! - [`commands`] -- builders for the commands the engine sends itself
//! - [`session`] -- per-connection state machine (no I/O)
//! - [`supervisor`] -- the single IO task and reconnect policy
//! - [`telemetry`] -- UDP level receiver
//! - [`config`] -- [`SessionConfig`] and its builder

pub mod commands;
pub mod config;
pub mod framer;
pub mod interpreter;
pub mod params;
pub mod queue;
pub mod session;
pub mod supervisor;
pub mod telemetry;

pub use config::{DEFAULT_PORT, SessionConfig, SessionConfigBuilder, TelemetryConfig};
pub use params::ParamValue;
pub use queue::{CommandKind, OutboundCommand};
pub use session::{Session, SessionSnapshot};
pub use supervisor::{CodecHandle, spawn_supervisor};
