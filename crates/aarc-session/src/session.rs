//! Per-connection session state machine.
//!
//! A [`Session`] is created for every connection attempt and dropped when
//! that connection ends. It performs no I/O: the supervisor feeds it
//! transport events and inbound bytes, and drains its command queue onto
//! the wire. Everything observable (phase, call state, parameters, levels)
//! is mirrored into a shared [`SessionSnapshot`] and announced as
//! [`CodecEvent`]s.
//!
//! ```text
//! Connecting ──connect──▶ Connected ──first reply──▶ Ready ⇄ Established
//!                                                     │  ▲
//!                                              ERROR<n>│  │OK
//!                                                     ▼  │
//!                                                    Error
//! any ──close──▶ Disconnected
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use aarc_core::error::Error;
use aarc_core::events::CodecEvent;
use aarc_core::types::{CallState, ConnectionPhase, LevelReport, Levels};
use aarc_core::DeviceError;

use crate::commands;
use crate::config::SessionConfig;
use crate::framer::{Frame, Framer};
use crate::interpreter::{self, CallEvent, Message, StatusReport};
use crate::params::{ParamValue, ParameterTable};
use crate::queue::{CommandQueue, OutboundCommand};

/// Codec status code meaning a call is up.
const STATUS_CALL_ACTIVE: &str = "11";

/// Everything a collaborator can read about the codec, as of the last
/// processed message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub phase: ConnectionPhase,
    pub call_state: CallState,
    pub parameters: ParameterTable,
    pub levels: Levels,
}

/// Move the published phase to `to`, emitting an event if it changed.
pub(crate) fn publish_phase(
    state: &watch::Sender<SessionSnapshot>,
    events: &broadcast::Sender<CodecEvent>,
    to: ConnectionPhase,
) {
    let mut from = to;
    state.send_if_modified(|snapshot| {
        from = snapshot.phase;
        snapshot.phase = to;
        from != to
    });
    if from != to {
        info!(from = %from, to = %to, "Session phase changed");
        let _ = events.send(CodecEvent::PhaseChanged { from, to });
    }
}

/// Fold a level report into the snapshot and announce the new table.
pub(crate) fn publish_levels(
    state: &watch::Sender<SessionSnapshot>,
    events: &broadcast::Sender<CodecEvent>,
    report: LevelReport,
) {
    let mut levels = Levels::default();
    state.send_modify(|snapshot| {
        snapshot.levels.apply(report);
        levels = snapshot.levels;
    });
    trace!(?levels, "Levels updated");
    let _ = events.send(CodecEvent::LevelsChanged(levels));
}

/// The live connection context.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    phase: ConnectionPhase,
    /// Set when `AT#PWD` is queued, cleared by the next `OK`.
    auth_pending: bool,
    /// The automatic password re-submission for the current failure has
    /// been used. Cleared once the codec acknowledges.
    auth_retried: bool,
    framer: Framer,
    queue: CommandQueue,
    call_state: CallState,
    params: ParameterTable,
    initialized: bool,
    polling: bool,
    events: broadcast::Sender<CodecEvent>,
    state: Arc<watch::Sender<SessionSnapshot>>,
}

impl Session {
    /// Start a session for a new connection attempt (phase `Connecting`).
    pub fn new(
        config: SessionConfig,
        events: broadcast::Sender<CodecEvent>,
        state: Arc<watch::Sender<SessionSnapshot>>,
    ) -> Self {
        let phase = state.borrow().phase;
        let queue = CommandQueue::new(config.command_spacing);
        let mut session = Session {
            config,
            phase,
            auth_pending: false,
            auth_retried: false,
            framer: Framer::new(),
            queue,
            call_state: CallState::Idle,
            params: ParameterTable::new(),
            initialized: false,
            polling: false,
            events,
            state,
        };
        session.set_phase(ConnectionPhase::Connecting);
        session
    }

    // -----------------------------------------------------------------
    // Transport lifecycle
    // -----------------------------------------------------------------

    /// The socket is open. The codec is asked for `ATI`; its first reply
    /// triggers initialization.
    pub fn on_transport_connected(&mut self) {
        self.set_phase(ConnectionPhase::Connected);
        self.queue.submit(commands::identify());
    }

    /// Feed a chunk read from the transport.
    pub fn on_data(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let frames: Vec<Frame> = self.framer.push(chunk).collect();
        for frame in frames {
            self.handle_message(frame.text());
        }
    }

    /// The transport failed mid-session.
    pub fn on_transport_error(&mut self, error: &Error) {
        error!(error = %error, "Transport error");
        self.set_phase(ConnectionPhase::Error);
    }

    /// The transport is gone. Resets every parameter to unknown, stops
    /// polling and drops anything still queued.
    pub fn on_closed(&mut self) {
        self.polling = false;
        self.auth_pending = false;
        self.queue.clear();
        self.framer.reset();
        self.params.reset();
        self.state.send_modify(|snapshot| snapshot.parameters.reset());
        self.set_call_state(CallState::Idle);
        self.set_phase(ConnectionPhase::Disconnected);
    }

    // -----------------------------------------------------------------
    // Message handling
    // -----------------------------------------------------------------

    /// Interpret one framed message.
    pub fn handle_message(&mut self, text: &str) {
        if self.phase == ConnectionPhase::Connected && !self.initialized {
            self.initialize();
        }

        match interpreter::classify(text) {
            Message::Ack => self.on_ack(),
            Message::Error(error) => self.on_device_error(error),
            Message::Call(event) => self.on_call_event(event),
            Message::Parameter { key, value } => {
                debug!(key, value = %value, "Parameter report");
                self.set_param(key, value);
            }
            Message::UnknownParameter { key, value } => {
                debug!(key = %key, value = %value, "Unhandled parameter");
            }
            Message::Status(report) => self.on_status(report),
            Message::Levels(report) => publish_levels(&self.state, &self.events, report),
            Message::Identification(banner) => {
                info!(banner = %banner, "Codec identified");
            }
            Message::Echo => trace!(message = %text, "Echo dropped"),
            Message::Unrecognized => debug!(message = %text, "Unrecognized message"),
        }
    }

    fn initialize(&mut self) {
        info!("Codec responded, initializing");
        for command in commands::initialization(&self.config) {
            self.queue.submit(command);
        }
        self.auth_pending = true;
        self.initialized = true;
        self.polling = self.config.polling.is_some() || self.config.vu_polling.is_some();
        self.set_phase(ConnectionPhase::Ready);
    }

    fn on_ack(&mut self) {
        if self.auth_pending {
            self.auth_retried = false;
        }
        self.auth_pending = false;
        if self.phase == ConnectionPhase::Error && self.initialized {
            self.set_phase(self.ready_phase());
        }
    }

    fn on_device_error(&mut self, error: DeviceError) {
        warn!(code = ?error, "Codec error: {}", error);
        let _ = self.events.send(CodecEvent::DeviceError(error));

        if error.is_auth_failure() {
            if self.auth_retried {
                warn!("Authentication rejected again, check the password");
            } else {
                info!("Re-sending password");
                self.auth_retried = true;
                self.auth_pending = true;
                self.queue.submit(commands::authenticate(&self.config.password));
            }
        }

        if self.phase.has_transport() {
            self.set_phase(ConnectionPhase::Error);
        }
    }

    fn on_call_event(&mut self, event: CallEvent) {
        let next = match event {
            CallEvent::Ringing => CallState::Ringing,
            CallEvent::Calling => CallState::Calling,
            CallEvent::Established => CallState::Established,
            CallEvent::Released => CallState::Released,
        };
        self.apply_call_state(next);
    }

    fn on_status(&mut self, report: StatusReport) {
        for (key, value) in report.updates() {
            self.set_param(key, value);
        }
        if let StatusReport::CodecStatus(code) = report {
            if code == STATUS_CALL_ACTIVE {
                self.apply_call_state(CallState::Established);
            } else if self.call_state == CallState::Established {
                self.apply_call_state(CallState::Released);
            }
        }
    }

    /// Set the call state and keep `Ready`/`Established` in step with it.
    fn apply_call_state(&mut self, next: CallState) {
        self.set_call_state(next);
        match self.phase {
            ConnectionPhase::Ready if next == CallState::Established => {
                self.set_phase(ConnectionPhase::Established)
            }
            ConnectionPhase::Established if next != CallState::Established => {
                self.set_phase(ConnectionPhase::Ready)
            }
            _ => {}
        }
    }

    fn ready_phase(&self) -> ConnectionPhase {
        if self.call_state == CallState::Established {
            ConnectionPhase::Established
        } else {
            ConnectionPhase::Ready
        }
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    /// Queue a command. Returns `false` if it was a duplicate query.
    pub fn submit(&mut self, command: OutboundCommand) -> bool {
        self.queue.submit(command)
    }

    /// Queue the full status battery. Returns how many were added.
    pub fn refresh(&mut self) -> usize {
        if !self.initialized {
            debug!(phase = %self.phase, "Refresh skipped, codec not initialized");
            return 0;
        }
        commands::status_battery()
            .filter(|command| self.queue.submit(command.clone()))
            .count()
    }

    /// Periodic status poll.
    pub fn poll(&mut self) -> usize {
        if !self.polling {
            return 0;
        }
        self.refresh()
    }

    /// Periodic VU level poll.
    pub fn vu_poll(&mut self) -> bool {
        if !self.polling || !self.initialized {
            return false;
        }
        self.queue.submit(commands::vu_poll())
    }

    /// When the head of the queue may be sent.
    pub fn next_due(&self) -> Option<Instant> {
        self.queue.next_due()
    }

    /// Pop the head of the queue if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<OutboundCommand> {
        self.queue.pop_due(now)
    }

    /// Record a transmission attempt, successful or not.
    pub fn record_attempt(&mut self, now: Instant) {
        self.queue.record_attempt(now);
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn call_state(&self) -> CallState {
        self.call_state
    }

    pub fn is_ready(&self) -> bool {
        self.phase.is_ready()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn auth_pending(&self) -> bool {
        self.auth_pending
    }

    /// Whether the periodic status and VU polls should run.
    pub fn polling_active(&self) -> bool {
        self.polling
    }

    pub fn parameter(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    // -----------------------------------------------------------------
    // State publication
    // -----------------------------------------------------------------

    fn set_phase(&mut self, to: ConnectionPhase) {
        self.phase = to;
        publish_phase(&self.state, &self.events, to);
    }

    fn set_call_state(&mut self, next: CallState) {
        if self.call_state == next {
            trace!(state = %next, "Call state unchanged");
            return;
        }
        info!(from = %self.call_state, to = %next, "Call state changed");
        self.call_state = next;
        self.state.send_modify(|snapshot| snapshot.call_state = next);
        let _ = self.events.send(CodecEvent::CallStateChanged(next));
    }

    fn set_param(&mut self, key: &'static str, value: String) {
        if !self.params.set(key, value.clone()) {
            return;
        }
        self.state.send_modify(|snapshot| {
            snapshot.parameters.set(key, value.clone());
        });
        let _ = self.events.send(CodecEvent::ParameterChanged { key, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use std::time::Duration;

    struct Fixture {
        session: Session,
        events: broadcast::Receiver<CodecEvent>,
        state: Arc<watch::Sender<SessionSnapshot>>,
    }

    fn fixture_with(config: SessionConfig) -> Fixture {
        let state = Arc::new(watch::Sender::new(SessionSnapshot::default()));
        let (tx, events) = broadcast::channel(256);
        let session = Session::new(config, tx, Arc::clone(&state));
        Fixture {
            session,
            events,
            state,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SessionConfig::default())
    }

    /// A session that has connected and seen its first `OK`.
    fn ready() -> Fixture {
        let mut f = fixture();
        f.session.on_transport_connected();
        f.session.on_data(b"OK\r\n");
        f.drain_events();
        f
    }

    impl Fixture {
        fn queued(&self) -> Vec<String> {
            self.session
                .queue()
                .iter()
                .map(|c| c.payload().to_string())
                .collect()
        }

        fn drain_events(&mut self) -> Vec<CodecEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        fn call_changes(&mut self) -> Vec<CallState> {
            self.drain_events()
                .into_iter()
                .filter_map(|e| match e {
                    CodecEvent::CallStateChanged(state) => Some(state),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn connect_identifies_the_codec() {
        let mut f = fixture();
        assert_eq!(f.session.phase(), ConnectionPhase::Connecting);
        f.session.on_transport_connected();
        assert_eq!(f.session.phase(), ConnectionPhase::Connected);
        assert_eq!(f.queued(), vec!["ATI"]);
        assert_eq!(f.state.borrow().phase, ConnectionPhase::Connected);
        assert_eq!(
            f.drain_events(),
            vec![
                CodecEvent::PhaseChanged {
                    from: ConnectionPhase::Disconnected,
                    to: ConnectionPhase::Connecting
                },
                CodecEvent::PhaseChanged {
                    from: ConnectionPhase::Connecting,
                    to: ConnectionPhase::Connected
                },
            ]
        );
    }

    #[test]
    fn first_ok_initializes_exactly_once() {
        let mut f = fixture();
        f.session.on_transport_connected();
        f.session.on_data(b"OK\r\n");

        assert_eq!(f.session.phase(), ConnectionPhase::Ready);
        assert!(f.session.is_initialized());
        assert!(f.session.polling_active());

        let mut expected = vec!["ATI", "AT#PWD="];
        expected.extend(commands::EVENT_SUBSCRIPTIONS);
        expected.extend(commands::STATUS_QUERIES);
        assert_eq!(f.queued(), expected);

        f.session.on_data(b"OK\r\nOK\r\n");
        assert_eq!(f.queued().len(), expected.len());
    }

    #[test]
    fn identification_banner_also_initializes() {
        let mut f = fixture();
        f.session.on_transport_connected();
        f.session.on_data(b"SCOOP 5 IP\r\n");
        assert_eq!(f.session.phase(), ConnectionPhase::Ready);
        assert_eq!(f.queued()[1], "AT#PWD=");
    }

    #[test]
    fn telemetry_enable_is_part_of_initialization() {
        let config = SessionConfig {
            telemetry: Some(TelemetryConfig::new("10.0.0.2", 5000, Duration::from_secs(1))),
            ..SessionConfig::default()
        };
        let mut f = fixture_with(config);
        f.session.on_transport_connected();
        f.session.on_data(b"OK\r\n");
        assert_eq!(
            f.queued().last().map(String::as_str),
            Some("AT#VUIP=10.0.0.2,5000,1000")
        );
    }

    #[test]
    fn auth_failure_resubmits_password_once() {
        let mut f = ready();
        let pwd_count = |f: &Fixture| f.queued().iter().filter(|c| *c == "AT#PWD=").count();
        assert_eq!(pwd_count(&f), 1);

        f.session.on_data(b"ERROR51\r\n");
        assert_eq!(pwd_count(&f), 2);
        assert!(f.session.auth_pending());
        assert_eq!(f.session.phase(), ConnectionPhase::Error);
        assert!(
            f.drain_events()
                .contains(&CodecEvent::DeviceError(DeviceError::AuthenticationFailed))
        );

        f.session.on_data(b"ERROR53\r\n");
        assert_eq!(pwd_count(&f), 2);
    }

    #[test]
    fn accepted_password_rearms_the_retry() {
        let mut f = ready();
        let pwd_count = |f: &Fixture| f.queued().iter().filter(|c| *c == "AT#PWD=").count();

        f.session.on_data(b"ERROR51\r\n");
        assert_eq!(pwd_count(&f), 2);
        f.session.on_data(b"OK\r\n");
        assert!(!f.session.auth_pending());
        assert_eq!(f.session.phase(), ConnectionPhase::Ready);

        f.session.on_data(b"ERROR51\r\n");
        assert_eq!(pwd_count(&f), 3);
        f.session.on_data(b"ERROR51\r\n");
        assert_eq!(pwd_count(&f), 3);
    }

    #[test]
    fn other_errors_are_diagnostic_only() {
        let mut f = ready();
        let before = f.queued().len();
        f.session.on_data(b"ERROR7\r\n");
        assert_eq!(f.queued().len(), before);
        assert_eq!(f.session.phase(), ConnectionPhase::Error);
        assert!(!f.session.is_ready());
    }

    #[test]
    fn ok_after_error_restores_ready_without_reinitializing() {
        let mut f = ready();
        let before = f.queued().len();
        f.session.on_data(b"ERROR4\r\n");
        f.session.on_data(b"OK\r\n");
        assert_eq!(f.session.phase(), ConnectionPhase::Ready);
        assert_eq!(f.queued().len(), before);
    }

    #[test]
    fn ok_after_error_restores_established_during_a_call() {
        let mut f = ready();
        f.session.on_data(b"$ESTABLISHED_1\r\nERROR8\r\n");
        assert_eq!(f.session.phase(), ConnectionPhase::Error);
        f.session.on_data(b"OK\r\n");
        assert_eq!(f.session.phase(), ConnectionPhase::Established);
    }

    #[test]
    fn coding_algorithm_updates_with_unknown_placeholder() {
        let mut f = ready();
        f.session.on_data(b"#COD1=7\r\n");
        assert_eq!(
            f.session.parameter("COD1"),
            Some(&ParamValue::Known("G722 - SRT".into()))
        );
        f.session.on_data(b"#COD1=999\r\n");
        assert_eq!(
            f.state.borrow().parameters.get("COD1"),
            Some(&ParamValue::Known("Unknown (999)".into()))
        );
        let changes: Vec<_> = f
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, CodecEvent::ParameterChanged { key: "COD1", .. }))
            .collect();
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn repeated_value_is_not_reannounced() {
        let mut f = ready();
        f.session.on_data(b"#NET=5\r\n#NET=5\r\n");
        let changes = f
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, CodecEvent::ParameterChanged { .. }))
            .count();
        assert_eq!(changes, 1);
    }

    #[test]
    fn established_marker_is_exclusive_and_idempotent() {
        let mut f = ready();
        f.session.on_data(b"$RINGING_1\r\n");
        assert_eq!(f.session.call_state(), CallState::Ringing);

        // Unterminated first, terminator later: framed twice, applied once.
        f.session.on_data(b"$ESTABLISHED_1");
        f.session.on_data(b"\r\n");
        assert_eq!(f.session.call_state(), CallState::Established);
        assert_eq!(f.session.phase(), ConnectionPhase::Established);

        let flags = f.state.borrow().call_state.flags();
        assert!(flags.established && !flags.ringing && !flags.calling && !flags.released);
        assert_eq!(
            f.call_changes(),
            vec![CallState::Ringing, CallState::Established]
        );
    }

    #[test]
    fn released_returns_to_ready() {
        let mut f = ready();
        f.session.on_data(b"CONNECT 1\r\n");
        assert_eq!(f.session.phase(), ConnectionPhase::Established);
        f.session.on_data(b"$RELEASED_1\r\n");
        assert_eq!(f.session.phase(), ConnectionPhase::Ready);
        assert_eq!(f.session.call_state(), CallState::Released);
    }

    #[test]
    fn codec_status_drives_call_state() {
        let mut f = ready();
        f.session.on_data(b"COD1:S=11\r\n");
        assert_eq!(f.session.call_state(), CallState::Established);
        assert_eq!(f.session.phase(), ConnectionPhase::Established);
        assert_eq!(
            f.session.parameter("COD1:S"),
            Some(&ParamValue::Known("11".into()))
        );

        f.session.on_data(b"COD1:S=0\r\n");
        assert_eq!(f.session.call_state(), CallState::Released);
        assert_eq!(f.session.phase(), ConnectionPhase::Ready);

        // A non-call status while idle leaves the call state alone.
        f.session.on_data(b"COD1:S=3\r\n");
        assert_eq!(f.session.call_state(), CallState::Released);
    }

    #[test]
    fn status_reports_fill_parameters() {
        let mut f = ready();
        f.session
            .on_data(b"ENT:APPEL1=1\r\nCFG=2\r\nBOU=0\r\nALA:D1=1,D2=0,D3=0\r\nN1=0612345678\r\n");
        let p = |key| f.session.parameter(key).and_then(|v| v.as_known()).map(str::to_string);
        assert_eq!(p("ENT:APPEL1").as_deref(), Some("Yes"));
        assert_eq!(p("CFG").as_deref(), Some("2"));
        assert_eq!(p("BOU").as_deref(), Some("0"));
        assert_eq!(p("ALA:D1").as_deref(), Some("1"));
        assert_eq!(p("N1").as_deref(), Some("0612345678"));
    }

    #[test]
    fn vu_reply_updates_levels() {
        let mut f = ready();
        f.session.on_data(b"#VU=-6,-9\r\n");
        let levels = f.state.borrow().levels;
        assert_eq!(levels.input, -6.0);
        assert_eq!(levels.output, -9.0);
    }

    #[test]
    fn malformed_messages_do_not_stop_processing() {
        let mut f = ready();
        f.session.on_data(b"ALA:D1=x\r\ngarbage\r\n#COD1=1\r\n");
        assert_eq!(
            f.session.parameter("COD1"),
            Some(&ParamValue::Known("G711 (Mono)".into()))
        );
    }

    #[test]
    fn close_resets_everything() {
        let mut f = ready();
        f.session.on_data(b"#COD1=7\r\n$ESTABLISHED_1\r\n#NET=");
        f.session.on_closed();

        assert_eq!(f.session.phase(), ConnectionPhase::Disconnected);
        assert_eq!(f.session.call_state(), CallState::Idle);
        assert!(!f.session.polling_active());
        assert!(f.session.queue().is_empty());
        assert_eq!(f.session.poll(), 0);
        assert!(!f.session.vu_poll());

        let snapshot = f.state.borrow();
        assert!(snapshot.parameters.iter().all(|(_, v)| *v == ParamValue::Unknown));
        assert_eq!(snapshot.call_state, CallState::Idle);
        assert_eq!(snapshot.phase, ConnectionPhase::Disconnected);
    }

    #[test]
    fn refresh_requires_initialization_and_dedupes() {
        let mut f = fixture();
        f.session.on_transport_connected();
        assert_eq!(f.session.refresh(), 0);

        f.session.on_data(b"OK\r\n");
        // The battery from initialization is still pending.
        assert_eq!(f.session.refresh(), 0);

        let now = Instant::now();
        while f.session.pop_due(now).is_some() {}
        assert_eq!(f.session.refresh(), commands::STATUS_QUERIES.len());
    }

    #[test]
    fn polling_disabled_by_config() {
        let config = SessionConfig {
            polling: None,
            ..SessionConfig::default()
        };
        let mut f = fixture_with(config);
        f.session.on_transport_connected();
        f.session.on_data(b"OK\r\n");
        assert!(!f.session.polling_active());
        assert_eq!(f.session.poll(), 0);
    }

    #[test]
    fn transport_error_moves_to_error_phase() {
        let mut f = ready();
        f.session.on_transport_error(&Error::ConnectionLost);
        assert_eq!(f.session.phase(), ConnectionPhase::Error);
    }
}
