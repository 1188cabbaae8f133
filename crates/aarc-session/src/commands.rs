//! AARC command builders used by the session itself.
//!
//! User-facing command templates live outside this crate; they reach the
//! engine as raw text through [`CodecHandle::submit`](crate::CodecHandle::submit).
//! The builders here cover connect, initialization, polling and telemetry.

use crate::config::{SessionConfig, TelemetryConfig};
use crate::queue::OutboundCommand;

/// Identification request sent right after the socket opens.
pub const IDENTIFY: &str = "ATI";

/// Status and configuration battery, in transmission order.
pub const STATUS_QUERIES: [&str; 12] = [
    "AT&V",   // basic configuration
    "AT#SUP", // current status, including the last connected number
    "AT&V0",  // last connected numbers
    "AT&V1",  // line
    "AT&V2",  // ISDN
    "AT&V3",  // audio
    "AT&V4",  // X24/V11
    "AT&V5",  // mobile
    "AT&V6",  // VoIP/IP
    "AT&V7",  // external devices
    "AT&V8",  // auxiliary functions
    "AT&V9",  // network
];

/// Unsolicited call-event subscriptions, one per call state.
pub const EVENT_SUBSCRIPTIONS: [&str; 4] = [
    "AT#RINGING_1=1",
    "AT#CALLING_1=1",
    "AT#ESTABLISHED_1=1",
    "AT#RELEASED_1=1",
];

/// Identification query sent on connect.
pub fn identify() -> OutboundCommand {
    OutboundCommand::query(IDENTIFY)
}

/// `AT#PWD=<password>`. Sent even when the password is empty, which
/// clears any authentication left over on the codec side.
pub fn authenticate(password: &str) -> OutboundCommand {
    let password: String = password.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    OutboundCommand::mutation(format!("AT#PWD={password}"))
}

/// Ask the codec to stream level datagrams to `telemetry.target_host`.
pub fn telemetry_enable(telemetry: &TelemetryConfig) -> OutboundCommand {
    OutboundCommand::mutation(format!(
        "AT#VUIP={},{},{}",
        telemetry.target_host.trim(),
        telemetry.port,
        telemetry.period.as_millis()
    ))
}

/// One VU level poll, answered with `#VU=<in>,<out>`.
pub fn vu_poll() -> OutboundCommand {
    OutboundCommand::query("AT#VU=1")
}

/// The full status battery.
pub fn status_battery() -> impl Iterator<Item = OutboundCommand> {
    STATUS_QUERIES.iter().map(|q| OutboundCommand::query(*q))
}

/// The initialization burst queued on the first reply of a session:
/// authentication, event subscriptions, the status battery and, when
/// configured, the telemetry enable.
pub fn initialization(config: &SessionConfig) -> Vec<OutboundCommand> {
    let mut commands = Vec::with_capacity(1 + EVENT_SUBSCRIPTIONS.len() + STATUS_QUERIES.len() + 1);
    commands.push(authenticate(&config.password));
    commands.extend(
        EVENT_SUBSCRIPTIONS
            .iter()
            .map(|s| OutboundCommand::mutation(*s)),
    );
    commands.extend(status_battery());
    if let Some(telemetry) = &config.telemetry {
        commands.push(telemetry_enable(telemetry));
    }
    commands
}

/// Wrap free text (e.g. an SMS body) in quotes, dropping any embedded
/// quote characters.
pub fn quote_free_text(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| *c != '"').collect();
    format!("\"{stripped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn payloads(commands: &[OutboundCommand]) -> Vec<&str> {
        commands.iter().map(|c| c.payload()).collect()
    }

    #[test]
    fn empty_password_is_still_sent() {
        assert_eq!(authenticate("").payload(), "AT#PWD=");
        assert!(!authenticate("").is_query());
    }

    #[test]
    fn password_cannot_inject_a_command() {
        assert_eq!(authenticate("pw\r\nATH").payload(), "AT#PWD=pwATH");
    }

    #[test]
    fn initialization_order_without_telemetry() {
        let config = SessionConfig::default();
        let commands = initialization(&config);
        let mut expected = vec!["AT#PWD="];
        expected.extend(EVENT_SUBSCRIPTIONS);
        expected.extend(STATUS_QUERIES);
        assert_eq!(payloads(&commands), expected);
    }

    #[test]
    fn initialization_appends_telemetry_enable() {
        let config = SessionConfig {
            password: "secret".into(),
            telemetry: Some(TelemetryConfig::new(
                "192.168.1.10",
                5000,
                Duration::from_millis(250),
            )),
            ..SessionConfig::default()
        };
        let commands = initialization(&config);
        assert_eq!(commands.first().map(|c| c.payload()), Some("AT#PWD=secret"));
        assert_eq!(
            commands.last().map(|c| c.payload()),
            Some("AT#VUIP=192.168.1.10,5000,250")
        );
        assert_eq!(commands.len(), 1 + 4 + 12 + 1);
    }

    #[test]
    fn battery_is_all_queries() {
        assert!(status_battery().all(|c| c.is_query()));
        assert_eq!(status_battery().count(), 12);
        assert!(vu_poll().is_query());
        assert!(identify().is_query());
    }

    #[test]
    fn free_text_quotes_are_stripped() {
        assert_eq!(quote_free_text("say \"hi\""), "\"say hi\"");
        assert_eq!(quote_free_text(""), "\"\"");
    }
}
