//! Shared value types: connection phase, call state, and audio levels.

use std::fmt;

/// Phase of the command-channel session.
///
/// The normal progression is
/// `Disconnected → Connecting → Connected → Ready ⇄ Established`.
/// `Error` is reachable from any connected phase; `BadConfig` is terminal
/// until the configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionPhase {
    /// No transport exists.
    #[default]
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The socket is open but the codec has not yet answered anything.
    Connected,
    /// Initialization has been queued; the codec is usable.
    Ready,
    /// Ready, and a call is currently established.
    Established,
    /// The codec reported an error (e.g. authentication) or the transport
    /// failed. Cleared by the next `OK` or by teardown.
    Error,
    /// No target host is configured. No automatic action is taken.
    BadConfig,
}

impl ConnectionPhase {
    /// Whether commands can be issued to a live codec in this phase.
    pub fn is_ready(self) -> bool {
        matches!(self, ConnectionPhase::Ready | ConnectionPhase::Established)
    }

    /// Whether a transport is currently open in this phase.
    pub fn has_transport(self) -> bool {
        matches!(
            self,
            ConnectionPhase::Connected
                | ConnectionPhase::Ready
                | ConnectionPhase::Established
                | ConnectionPhase::Error
        )
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Ready => "ready",
            ConnectionPhase::Established => "established",
            ConnectionPhase::Error => "error",
            ConnectionPhase::BadConfig => "bad-config",
        };
        f.write_str(s)
    }
}

/// Mutually exclusive phase of the codec's call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallState {
    /// No call activity has been reported this session.
    #[default]
    Idle,
    /// An incoming call is ringing.
    Ringing,
    /// An outgoing call is being placed.
    Calling,
    /// A call is established.
    Established,
    /// The last call was released.
    Released,
}

impl CallState {
    /// Boolean view of the four call flags. At most one is ever set.
    pub fn flags(self) -> CallFlags {
        CallFlags {
            ringing: self == CallState::Ringing,
            calling: self == CallState::Calling,
            established: self == CallState::Established,
            released: self == CallState::Released,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Calling => "calling",
            CallState::Established => "established",
            CallState::Released => "released",
        };
        f.write_str(s)
    }
}

/// The four call flags as exposed to feedback consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags {
    pub ringing: bool,
    pub calling: bool,
    pub established: bool,
    pub released: bool,
}

/// Level reported for a silent channel.
pub const SILENCE_FLOOR_DB: f32 = -60.0;

/// A decoded audio-level report, from either a telemetry datagram or a
/// `#VU=` reply on the command channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelReport {
    /// Four-channel report, already converted to dB (negated attenuation,
    /// silence mapped to [`SILENCE_FLOOR_DB`]).
    Channels([f32; 4]),
    /// Legacy input/output pair in dB.
    InputOutput { input: f32, output: f32 },
}

/// Latest audio levels, in dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub channels: [f32; 4],
    pub input: f32,
    pub output: f32,
}

impl Default for Levels {
    fn default() -> Self {
        Levels {
            channels: [SILENCE_FLOOR_DB; 4],
            input: SILENCE_FLOOR_DB,
            output: SILENCE_FLOOR_DB,
        }
    }
}

impl Levels {
    /// Fold a report into the table.
    pub fn apply(&mut self, report: LevelReport) {
        match report {
            LevelReport::Channels(channels) => self.channels = channels,
            LevelReport::InputOutput { input, output } => {
                self.input = input;
                self.output = output;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_phases() {
        assert!(ConnectionPhase::Ready.is_ready());
        assert!(ConnectionPhase::Established.is_ready());
        assert!(!ConnectionPhase::Connected.is_ready());
        assert!(!ConnectionPhase::Error.is_ready());
        assert!(!ConnectionPhase::BadConfig.is_ready());
    }

    #[test]
    fn phase_display() {
        assert_eq!(ConnectionPhase::BadConfig.to_string(), "bad-config");
        assert_eq!(ConnectionPhase::Established.to_string(), "established");
    }

    #[test]
    fn call_flags_are_exclusive() {
        for state in [
            CallState::Idle,
            CallState::Ringing,
            CallState::Calling,
            CallState::Established,
            CallState::Released,
        ] {
            let f = state.flags();
            let set = [f.ringing, f.calling, f.established, f.released]
                .iter()
                .filter(|b| **b)
                .count();
            let expected = if state == CallState::Idle { 0 } else { 1 };
            assert_eq!(set, expected, "{state}");
        }
    }

    #[test]
    fn levels_default_to_floor() {
        let levels = Levels::default();
        assert_eq!(levels.input, SILENCE_FLOOR_DB);
        assert_eq!(levels.channels, [SILENCE_FLOOR_DB; 4]);
    }

    #[test]
    fn levels_apply_keeps_other_report_kind() {
        let mut levels = Levels::default();
        levels.apply(LevelReport::InputOutput {
            input: -12.0,
            output: -18.0,
        });
        levels.apply(LevelReport::Channels([-1.0, -2.0, -3.0, -4.0]));
        assert_eq!(levels.input, -12.0);
        assert_eq!(levels.output, -18.0);
        assert_eq!(levels.channels, [-1.0, -2.0, -3.0, -4.0]);
    }
}
