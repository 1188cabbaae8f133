//! Classification of framed AARC messages.
//!
//! [`classify`] maps one trimmed message to a [`Message`]. Rules are tried
//! in a fixed order and the first match wins:
//!
//! 1. `OK`
//! 2. `ERROR<n>`
//! 3. call markers (`$RINGING_1` ...) and `CONNECT 1`
//! 4. `#KEY=VALUE` parameter reports (the `#` is optional for known keys)
//! 5. fixed-prefix status reports (`COD1:S=`, `ENT:APPEL1=`, `CFG=`, `BOU=`,
//!    `ALA:D1=..,D2=..,D3=..`, `N1=<digits>`)
//! 6. identification banner, command echoes, and everything else
//!
//! Each message is classified on its own. There is no state here.

use aarc_core::{DeviceError, LevelReport};

use crate::params::{self, ParamSpec};
use crate::telemetry;

/// A call event carried by a marker or `CONNECT 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    Ringing,
    Calling,
    Established,
    Released,
}

impl CallEvent {
    fn from_marker(text: &str) -> Option<Self> {
        let event = match text {
            "$RINGING_1" => CallEvent::Ringing,
            "$CALLING_1" => CallEvent::Calling,
            "$ESTABLISHED_1" | "CONNECT 1" => CallEvent::Established,
            "$RELEASED_1" => CallEvent::Released,
            _ => return None,
        };
        Some(event)
    }
}

/// A fixed-prefix status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// `COD1:S=<code>`. Code `11` means a call is up.
    CodecStatus(String),
    /// `ENT:APPEL1=<0|1>`.
    IncomingCall(String),
    /// `CFG=<n>`.
    ConfigNumber(String),
    /// `BOU=<n>`.
    TestLoop(String),
    /// `ALA:D1=<a>,D2=<b>,D3=<c>`.
    Alarms([String; 3]),
    /// `N1=<digits>` anywhere in the line (from `AT#SUP`).
    LastNumber(String),
}

impl StatusReport {
    /// The parameter-table updates this report implies, decoded.
    pub fn updates(&self) -> Vec<(&'static str, String)> {
        let decode = |key: &'static str, raw: &str| {
            let value = params::lookup_any(key)
                .map(|spec| spec.decoder.decode(raw))
                .unwrap_or_else(|| raw.to_string());
            (key, value)
        };
        match self {
            StatusReport::CodecStatus(v) => vec![decode("COD1:S", v)],
            StatusReport::IncomingCall(v) => vec![decode("ENT:APPEL1", v)],
            StatusReport::ConfigNumber(v) => vec![decode("CFG", v)],
            StatusReport::TestLoop(v) => vec![decode("BOU", v)],
            StatusReport::Alarms([d1, d2, d3]) => vec![
                decode("ALA:D1", d1),
                decode("ALA:D2", d2),
                decode("ALA:D3", d3),
            ],
            StatusReport::LastNumber(v) => vec![decode("N1", v)],
        }
    }
}

/// What a single inbound message means.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `OK`.
    Ack,
    /// `ERROR<n>`.
    Error(DeviceError),
    /// A call-state event.
    Call(CallEvent),
    /// A known parameter with its decoded value.
    Parameter { key: &'static str, value: String },
    /// A `#KEY=VALUE` report for a key outside the table.
    UnknownParameter { key: String, value: String },
    /// A fixed-prefix status report.
    Status(StatusReport),
    /// A `#VU=<in>,<out>` level reply.
    Levels(LevelReport),
    /// The identification banner sent in answer to `ATI`.
    Identification(String),
    /// A command echo or continuation marker, dropped silently.
    Echo,
    /// Anything else.
    Unrecognized,
}

/// Classify one framed, trimmed message.
pub fn classify(text: &str) -> Message {
    if text == "OK" {
        return Message::Ack;
    }

    if let Some(rest) = text.strip_prefix("ERROR") {
        return Message::Error(DeviceError::from_code(error_code(rest)));
    }

    if let Some(event) = CallEvent::from_marker(text) {
        return Message::Call(event);
    }

    if let Some(message) = parameter_report(text) {
        return message;
    }

    if let Some(report) = status_report(text) {
        return Message::Status(report);
    }

    if text.starts_with("ALA:D1=") {
        // Malformed alarm triple; extraction fails quietly.
        return Message::Unrecognized;
    }

    if text.contains("SCOOP") {
        return Message::Identification(text.to_string());
    }

    if is_echo(text) {
        return Message::Echo;
    }

    Message::Unrecognized
}

/// First run of digits after `ERROR`, if any.
fn error_code(rest: &str) -> Option<u32> {
    let start = rest.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = &rest[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse().ok()
}

fn is_echo(text: &str) -> bool {
    text.starts_with("AT") || text.starts_with("-C")
}

fn is_word(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `#KEY=VALUE`, or `KEY=VALUE` for keys in the main table.
fn parameter_report(text: &str) -> Option<Message> {
    let (hashed, body) = match text.strip_prefix('#') {
        Some(body) => (true, body),
        None => (false, text),
    };
    let (key, raw) = body.split_once('=')?;
    if !is_word(key) || raw.is_empty() {
        return None;
    }
    // The device appends trailing fields after a space; only the first
    // token is the value.
    let value = raw.split(' ').next().unwrap_or_default();

    if let Some(spec) = params::lookup(key) {
        return Some(known_parameter(spec, value));
    }
    if !hashed {
        return None;
    }

    if key == "VU" {
        return Some(match telemetry::parse_vu_pair(raw) {
            Some(report) => Message::Levels(report),
            None => Message::Unrecognized,
        });
    }
    if is_echo(key) {
        return Some(Message::Echo);
    }
    Some(Message::UnknownParameter {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn known_parameter(spec: &'static ParamSpec, value: &str) -> Message {
    Message::Parameter {
        key: spec.mnemonic,
        value: spec.decoder.decode(value),
    }
}

fn field_after_eq(text: &str) -> String {
    text.split('=').nth(1).unwrap_or_default().to_string()
}

fn status_report(text: &str) -> Option<StatusReport> {
    if text.starts_with("COD1:S=") {
        return Some(StatusReport::CodecStatus(field_after_eq(text)));
    }
    if text.starts_with("ENT:APPEL1=") {
        return Some(StatusReport::IncomingCall(field_after_eq(text)));
    }
    if text.starts_with("CFG=") {
        return Some(StatusReport::ConfigNumber(field_after_eq(text)));
    }
    if text.starts_with("BOU=") {
        return Some(StatusReport::TestLoop(field_after_eq(text)));
    }
    if text.starts_with("ALA:D1=") {
        return alarm_triple(text).map(StatusReport::Alarms);
    }
    if let Some(number) = digits_after(text, "N1=") {
        return Some(StatusReport::LastNumber(number));
    }
    None
}

/// `D1=<n>,D2=<n>,D3=<n>` somewhere in `text`.
fn alarm_triple(text: &str) -> Option<[String; 3]> {
    let start = text.find("D1=")?;
    let mut fields = text[start..].split(',');
    let mut out: [String; 3] = Default::default();
    for (i, label) in ["D1=", "D2=", "D3="].iter().enumerate() {
        let field = fields.next()?.strip_prefix(label)?;
        let digits: String = field.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        out[i] = digits;
    }
    Some(out)
}

/// The digit run following the first `label` occurrence that has one.
fn digits_after(text: &str, label: &str) -> Option<String> {
    text.match_indices(label).find_map(|(at, _)| {
        let digits: String = text[at + label.len()..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        (!digits.is_empty()).then_some(digits)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(key: &'static str, value: &str) -> Message {
        Message::Parameter {
            key,
            value: value.to_string(),
        }
    }

    #[test]
    fn ack() {
        assert_eq!(classify("OK"), Message::Ack);
        assert_ne!(classify("OKAY"), Message::Ack);
    }

    #[test]
    fn error_codes() {
        assert_eq!(
            classify("ERROR51"),
            Message::Error(DeviceError::AuthenticationFailed)
        );
        assert_eq!(
            classify("ERROR 53"),
            Message::Error(DeviceError::AuthenticationFailed)
        );
        assert_eq!(classify("ERROR7"), Message::Error(DeviceError::Busy));
        assert_eq!(
            classify("ERROR"),
            Message::Error(DeviceError::Unknown(None))
        );
        assert_eq!(
            classify("ERROR99999999999"),
            Message::Error(DeviceError::Unknown(None))
        );
    }

    #[test]
    fn call_markers() {
        assert_eq!(classify("$RINGING_1"), Message::Call(CallEvent::Ringing));
        assert_eq!(classify("$CALLING_1"), Message::Call(CallEvent::Calling));
        assert_eq!(
            classify("$ESTABLISHED_1"),
            Message::Call(CallEvent::Established)
        );
        assert_eq!(
            classify("CONNECT 1"),
            Message::Call(CallEvent::Established)
        );
        assert_eq!(classify("$RELEASED_1"), Message::Call(CallEvent::Released));
        assert_eq!(classify("$RINGING_2"), Message::Unrecognized);
    }

    #[test]
    fn coding_algorithm_reports() {
        assert_eq!(classify("#COD1=7"), param("COD1", "G722 - SRT"));
        assert_eq!(classify("#COD1=999"), param("COD1", "Unknown (999)"));
    }

    #[test]
    fn value_is_cut_at_first_space() {
        assert_eq!(classify("#LOC1=Studio A"), param("LOC1", "Studio"));
        assert_eq!(classify("#LOC2= trailing"), param("LOC2", "None"));
    }

    #[test]
    fn hash_is_optional_for_known_keys() {
        assert_eq!(classify("NET=5"), param("NET", "IP"));
        assert_eq!(classify("XYZ=5"), Message::Unrecognized);
    }

    #[test]
    fn unknown_and_echo_parameters() {
        assert_eq!(
            classify("#XYZ=5"),
            Message::UnknownParameter {
                key: "XYZ".into(),
                value: "5".into()
            }
        );
        assert_eq!(classify("#ATCOD1=7"), Message::Echo);
        assert_eq!(classify("#COD1="), Message::Unrecognized);
    }

    #[test]
    fn vu_reply_is_a_level_report() {
        assert_eq!(
            classify("#VU=-12,-18"),
            Message::Levels(LevelReport::InputOutput {
                input: -12.0,
                output: -18.0
            })
        );
        assert_eq!(classify("#VU=abc"), Message::Unrecognized);
    }

    #[test]
    fn status_reports() {
        assert_eq!(
            classify("COD1:S=11"),
            Message::Status(StatusReport::CodecStatus("11".into()))
        );
        assert_eq!(
            classify("ENT:APPEL1=1"),
            Message::Status(StatusReport::IncomingCall("1".into()))
        );
        assert_eq!(
            classify("CFG=3"),
            Message::Status(StatusReport::ConfigNumber("3".into()))
        );
        assert_eq!(
            classify("BOU=0"),
            Message::Status(StatusReport::TestLoop("0".into()))
        );
        assert_eq!(
            classify("ALA:D1=0,D2=1,D3=2"),
            Message::Status(StatusReport::Alarms(["0".into(), "1".into(), "2".into()]))
        );
    }

    #[test]
    fn malformed_alarm_is_unrecognized() {
        assert_eq!(classify("ALA:D1=0,D2="), Message::Unrecognized);
        assert_eq!(classify("ALA:D1=x"), Message::Unrecognized);
    }

    #[test]
    fn last_number_anywhere_in_line() {
        assert_eq!(
            classify("STATUS N1=0612345678 N2=0"),
            Message::Status(StatusReport::LastNumber("0612345678".into()))
        );
        assert_eq!(classify("STATUS N1= none"), Message::Unrecognized);
    }

    #[test]
    fn status_updates_are_decoded() {
        assert_eq!(
            StatusReport::IncomingCall("1".into()).updates(),
            vec![("ENT:APPEL1", "Yes".to_string())]
        );
        assert_eq!(
            StatusReport::Alarms(["0".into(), "1".into(), "0".into()]).updates(),
            vec![
                ("ALA:D1", "0".to_string()),
                ("ALA:D2", "1".to_string()),
                ("ALA:D3", "0".to_string()),
            ]
        );
    }

    #[test]
    fn banner_echo_and_noise() {
        assert_eq!(
            classify("SCOOP 5 IP V2.1"),
            Message::Identification("SCOOP 5 IP V2.1".into())
        );
        assert_eq!(classify("AT&V"), Message::Echo);
        assert_eq!(classify("-C 12"), Message::Echo);
        assert_eq!(classify("garbage"), Message::Unrecognized);
    }

    #[test]
    fn error_takes_precedence_over_parameter() {
        // An ERROR line that also looks like a parameter stays an error.
        assert_eq!(
            classify("ERROR5=1"),
            Message::Error(DeviceError::InvalidParameter)
        );
    }
}
