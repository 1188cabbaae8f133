//! Asynchronous codec event types.
//!
//! Events are emitted by the session engine through a
//! [`tokio::sync::broadcast`] channel. Feedback and variable layers subscribe
//! to these for UI updates instead of polling the snapshot.

use crate::error::DeviceError;
use crate::types::{CallState, ConnectionPhase, Levels};

/// An event emitted when codec or session state changes.
///
/// Delivery is best-effort through a bounded broadcast channel; slow
/// consumers may miss events. The session snapshot is always authoritative.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecEvent {
    /// The session phase changed.
    PhaseChanged {
        /// Phase before the transition.
        from: ConnectionPhase,
        /// Phase after the transition.
        to: ConnectionPhase,
    },

    /// The call state changed. Never emitted for a no-op transition.
    CallStateChanged(CallState),

    /// A parameter report updated a value.
    ParameterChanged {
        /// Device mnemonic (e.g. `"COD1"`).
        key: &'static str,
        /// Decoded value.
        value: String,
    },

    /// The codec answered with `ERROR<n>`.
    DeviceError(DeviceError),

    /// The audio level table changed.
    LevelsChanged(Levels),

    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// The reconnection attempt number (1-based).
        attempt: u32,
    },
}
