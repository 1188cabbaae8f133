//! Error types for the AARC client.
//!
//! Two distinct families live here. [`Error`] covers failures on our side of
//! the wire (sockets, configuration, a vanished IO task). [`DeviceError`] is
//! the codec's own `ERROR<n>` taxonomy: it is decoded from inbound messages
//! and only ever logged or surfaced as an event, never returned from a call.

/// The error type for all fallible client operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, UDP bind).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected reply where one was required).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out establishing a connection or waiting for data.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the codec has been established, or the IO task
    /// has exited.
    #[error("not connected")]
    NotConnected,

    /// The connection to the codec was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// The configuration names a target that cannot be dialled.
    #[error("bad configuration: {0}")]
    BadConfig(String),

    /// An invalid parameter was passed to a command builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes reported by the codec as `ERROR<n>`.
///
/// Only [`DeviceError::AuthenticationFailed`] triggers corrective action
/// (a single re-submission of the password command). Every other code is
/// diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceError {
    /// `ERROR0`: the command mnemonic is not recognized.
    CommandUnrecognized,
    /// `ERROR3`: the command is not allowed in the current state.
    NotAllowedInState,
    /// `ERROR4`: a parameter value is out of range.
    OutOfRange,
    /// `ERROR5`: a parameter is invalid.
    InvalidParameter,
    /// `ERROR7`: the system is busy.
    Busy,
    /// `ERROR8`: the system is locked.
    Locked,
    /// `ERROR51` / `ERROR53`: authentication failed.
    AuthenticationFailed,
    /// Any other code, or an `ERROR` without a numeric code.
    Unknown(Option<u32>),
}

impl DeviceError {
    /// Map a numeric AARC error code to its taxonomy entry.
    pub fn from_code(code: Option<u32>) -> Self {
        match code {
            Some(0) => DeviceError::CommandUnrecognized,
            Some(3) => DeviceError::NotAllowedInState,
            Some(4) => DeviceError::OutOfRange,
            Some(5) => DeviceError::InvalidParameter,
            Some(7) => DeviceError::Busy,
            Some(8) => DeviceError::Locked,
            Some(51) | Some(53) => DeviceError::AuthenticationFailed,
            other => DeviceError::Unknown(other),
        }
    }

    /// Whether this code means the password was rejected.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, DeviceError::AuthenticationFailed)
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::CommandUnrecognized => write!(f, "command not recognized"),
            DeviceError::NotAllowedInState => write!(f, "command not allowed in current state"),
            DeviceError::OutOfRange => write!(f, "parameter value out of range"),
            DeviceError::InvalidParameter => write!(f, "invalid parameter"),
            DeviceError::Busy => write!(f, "system busy"),
            DeviceError::Locked => write!(f, "command not allowed (system locked)"),
            DeviceError::AuthenticationFailed => write!(f, "authentication failed"),
            DeviceError::Unknown(Some(code)) => write!(f, "unknown error code {code}"),
            DeviceError::Unknown(None) => write!(f, "unknown error"),
        }
    }
}
