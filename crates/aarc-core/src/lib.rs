//! aarc-core: Core traits, types, and error definitions for the AARC client.
//!
//! This crate defines the transport-agnostic abstractions shared by the
//! session engine, the concrete transports, and the test harness.
//!
//! # Key types
//!
//! - [`Transport`] / [`Connector`] -- byte-level communication channel
//! - [`CodecEvent`] -- asynchronous state change notifications
//! - [`ConnectionPhase`], [`CallState`], [`Levels`] -- observable state
//! - [`Error`] / [`Result`] / [`DeviceError`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{DeviceError, Error, Result};
pub use events::CodecEvent;
pub use transport::{Connector, Transport};
pub use types::*;
