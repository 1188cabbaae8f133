//! Reconnect supervisor and the single IO task.
//!
//! [`spawn_supervisor`] starts one tokio task that owns the [`Connector`],
//! the current transport and the current [`Session`]. Everything the
//! engine does happens inside that task's `select!` loop: handle requests,
//! paced command transmission, status and VU polling, the debounced
//! refresh, and transport reads. Collaborators talk to it through a
//! [`CodecHandle`].
//!
//! After a close or failure the task waits `reconnect_delay` and tries
//! again with a fresh transport and a fresh session. A manual reconnect or
//! a new configuration cancels any pending wait first, so there is never
//! more than one attempt in flight.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use aarc_core::error::{Error, Result};
use aarc_core::events::CodecEvent;
use aarc_core::transport::{Connector, Transport};
use aarc_core::types::{CallState, ConnectionPhase, Levels};
use aarc_transport::UdpTransport;

use crate::config::SessionConfig;
use crate::params::ParamValue;
use crate::queue::OutboundCommand;
use crate::session::{Session, SessionSnapshot, publish_phase};
use crate::telemetry::{self, TelemetryTask};

/// Upper bound on one transport read before the loop re-checks its timers.
const READ_POLL: std::time::Duration = std::time::Duration::from_millis(50);

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Capacity of the request channel.
const REQUEST_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A request sent from a [`CodecHandle`] to the IO task.
#[derive(Debug)]
pub enum Request {
    /// Queue a command on the live session.
    Submit(OutboundCommand),
    /// Queue the status battery now.
    RefreshNow,
    /// Queue the status battery once requests stop arriving.
    RefreshDebounced,
    /// Drop the current connection (or pending wait) and connect again.
    Reconnect,
    /// Replace the configuration and reconnect.
    Reconfigure(SessionConfig),
}

/// What the supervisor does next.
#[derive(Debug)]
enum Next {
    ConnectNow,
    WaitThenConnect,
    Idle,
    Reconfigure(SessionConfig),
    Shutdown,
}

/// Handle to a running supervisor.
///
/// Reads (`phase`, `current_parameter`, ...) are served from the latest
/// snapshot and never wait on the IO task. Commands are fire-and-forget:
/// `Ok(())` means the request reached the task, not that the codec
/// accepted it.
pub struct CodecHandle {
    tx: mpsc::Sender<Request>,
    events: broadcast::Sender<CodecEvent>,
    state: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CodecHandle {
    async fn request(&self, request: Request) -> Result<()> {
        self.tx.send(request).await.map_err(|_| Error::NotConnected)
    }

    /// Submit raw command text, classifying it as query or mutation.
    pub async fn submit(&self, command: &str) -> Result<()> {
        if command.trim().is_empty() {
            return Err(Error::InvalidParameter("empty command".into()));
        }
        self.submit_command(OutboundCommand::classify(command)).await
    }

    /// Submit a pre-classified command.
    pub async fn submit_command(&self, command: OutboundCommand) -> Result<()> {
        self.request(Request::Submit(command)).await
    }

    /// Queue the full status battery immediately.
    pub async fn refresh_now(&self) -> Result<()> {
        self.request(Request::RefreshNow).await
    }

    /// Queue the status battery after the debounce period. Repeated calls
    /// within the period collapse into one refresh.
    pub async fn refresh_debounced(&self) -> Result<()> {
        self.request(Request::RefreshDebounced).await
    }

    /// Drop the current connection and connect again immediately.
    pub async fn reconnect(&self) -> Result<()> {
        self.request(Request::Reconnect).await
    }

    /// Replace the configuration. The current connection is closed and a
    /// new one is made with the new settings.
    pub async fn reconfigure(&self, config: SessionConfig) -> Result<()> {
        self.request(Request::Reconfigure(config)).await
    }

    /// Close the connection and stop the IO task.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| Error::Protocol(format!("supervisor task failed: {e}")))
    }

    /// Last known value of `key`, or `None` for an unknown mnemonic.
    pub fn current_parameter(&self, key: &str) -> Option<ParamValue> {
        self.state.borrow().parameters.get(key).cloned()
    }

    pub fn current_call_state(&self) -> CallState {
        self.state.borrow().call_state
    }

    /// Whether the codec is connected, initialized and not in error.
    pub fn is_ready(&self) -> bool {
        self.state.borrow().phase.is_ready()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.borrow().phase
    }

    pub fn levels(&self) -> Levels {
        self.state.borrow().levels
    }

    /// A copy of everything observable.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// A receiver that can await snapshot changes.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Subscribe to codec events.
    pub fn subscribe(&self) -> broadcast::Receiver<CodecEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Start the supervisor. It connects immediately if a host is configured.
pub fn spawn_supervisor(config: SessionConfig, connector: Box<dyn Connector>) -> CodecHandle {
    let (tx, requests) = mpsc::channel(REQUEST_CAPACITY);
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let state = Arc::new(watch::Sender::new(SessionSnapshot::default()));
    let receiver = state.subscribe();
    let cancel = CancellationToken::new();

    let supervisor = Supervisor {
        config,
        connector,
        requests,
        events: events.clone(),
        state,
        cancel: cancel.clone(),
        telemetry: None,
        attempt: 0,
    };
    let task = tokio::spawn(supervisor.run());

    CodecHandle {
        tx,
        events,
        state: receiver,
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

struct Supervisor {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    requests: mpsc::Receiver<Request>,
    events: broadcast::Sender<CodecEvent>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    cancel: CancellationToken,
    telemetry: Option<TelemetryTask>,
    /// Consecutive reconnect attempts since the last successful connect.
    attempt: u32,
}

impl Supervisor {
    async fn run(mut self) {
        self.restart_telemetry().await;

        let mut next = Next::ConnectNow;
        loop {
            next = match next {
                Next::ConnectNow => self.connect().await,
                Next::WaitThenConnect => self.wait_reconnect().await,
                Next::Idle => self.idle().await,
                Next::Reconfigure(config) => {
                    info!("Configuration changed, reconnecting");
                    self.config = config;
                    self.attempt = 0;
                    self.restart_telemetry().await;
                    Next::ConnectNow
                }
                Next::Shutdown => break,
            };
        }

        if let Some(task) = self.telemetry.take() {
            task.stop().await;
        }
        publish_phase(&self.state, &self.events, ConnectionPhase::Disconnected);
        debug!("Supervisor stopped");
    }

    /// Make one connection attempt and, on success, run the session until
    /// it ends.
    async fn connect(&mut self) -> Next {
        let Some(host) = self.config.target_host().map(str::to_string) else {
            warn!("No codec host configured");
            publish_phase(&self.state, &self.events, ConnectionPhase::BadConfig);
            return Next::Idle;
        };
        let port = self.config.port;
        let timeout = self.config.connect_timeout;

        let mut session = Session::new(
            self.config.clone(),
            self.events.clone(),
            Arc::clone(&self.state),
        );
        info!(host = %host, port, "Connecting to codec");

        let transport = {
            let mut connecting = self.connector.connect(&host, port, timeout);
            loop {
                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => {
                        session.on_closed();
                        return Next::Shutdown;
                    }

                    req = self.requests.recv() => match req {
                        None => {
                            session.on_closed();
                            return Next::Shutdown;
                        }
                        Some(Request::Reconnect) => {
                            info!("Reconnect requested, restarting attempt");
                            session.on_closed();
                            return Next::ConnectNow;
                        }
                        Some(Request::Reconfigure(config)) => {
                            session.on_closed();
                            return Next::Reconfigure(config);
                        }
                        Some(other) => drop_while_disconnected(other),
                    },

                    result = &mut connecting => match result {
                        Ok(transport) => break transport,
                        Err(e) => {
                            warn!(host = %host, port, error = %e, "Connection attempt failed");
                            session.on_transport_error(&e);
                            session.on_closed();
                            return Next::WaitThenConnect;
                        }
                    },
                }
            }
        };

        self.attempt = 0;
        self.run_session(session, transport).await
    }

    /// The IO loop for one live connection.
    async fn run_session(&mut self, mut session: Session, mut transport: Box<dyn Transport>) -> Next {
        session.on_transport_connected();

        let mut poll: Option<Interval> = None;
        let mut vu: Option<Interval> = None;
        let mut debounce: Option<Instant> = None;
        let mut buf = [0u8; 1024];

        let next = loop {
            if session.polling_active() {
                if poll.is_none() {
                    poll = self.config.polling.map(periodic);
                }
                if vu.is_none() {
                    vu = self.config.vu_polling.map(periodic);
                }
            } else {
                poll = None;
                vu = None;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Supervisor cancelled");
                    break Next::Shutdown;
                }

                req = self.requests.recv() => match req {
                    None => {
                        debug!("All handles dropped, shutting down");
                        break Next::Shutdown;
                    }
                    Some(Request::Submit(command)) => {
                        if !session.submit(command) {
                            debug!("Duplicate query dropped");
                        }
                    }
                    Some(Request::RefreshNow) => {
                        debounce = None;
                        session.refresh();
                    }
                    Some(Request::RefreshDebounced) => {
                        debounce = Some(Instant::now() + self.config.refresh_debounce);
                    }
                    Some(Request::Reconnect) => {
                        info!("Reconnect requested");
                        break Next::ConnectNow;
                    }
                    Some(Request::Reconfigure(config)) => break Next::Reconfigure(config),
                },

                _ = sleep_until_opt(session.next_due()) => {
                    let now = Instant::now();
                    if let Some(command) = session.pop_due(now) {
                        debug!(command = %command.payload(), "Sending command");
                        if let Err(e) = transport.send(&command.encode()).await {
                            error!(command = %command.payload(), error = %e, "Failed to send command");
                        }
                        session.record_attempt(now);
                    }
                }

                _ = tick_opt(&mut poll) => {
                    let queued = session.poll();
                    debug!(queued, "Status poll");
                }

                _ = tick_opt(&mut vu) => {
                    session.vu_poll();
                }

                _ = sleep_until_opt(debounce) => {
                    debounce = None;
                    session.refresh();
                }

                result = transport.receive(&mut buf, READ_POLL) => match result {
                    Ok(n) => session.on_data(&buf[..n]),
                    Err(Error::Timeout) => {}
                    Err(Error::ConnectionLost) => {
                        info!("Codec closed the connection");
                        break Next::WaitThenConnect;
                    }
                    Err(e) => {
                        session.on_transport_error(&e);
                        break Next::WaitThenConnect;
                    }
                },
            }
        };

        if let Err(e) = transport.close().await {
            warn!(error = %e, "Error closing transport (continuing anyway)");
        }
        session.on_closed();
        next
    }

    /// Wait out the reconnect delay. Manual reconnects and configuration
    /// changes cut the wait short.
    async fn wait_reconnect(&mut self) -> Next {
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.config.reconnect_delay;
        info!(
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        let _ = self.events.send(CodecEvent::Reconnecting {
            attempt: self.attempt,
        });

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Next::Shutdown,

                req = self.requests.recv() => match req {
                    None => return Next::Shutdown,
                    Some(Request::Reconnect) => {
                        info!("Reconnect requested, skipping delay");
                        return Next::ConnectNow;
                    }
                    Some(Request::Reconfigure(config)) => return Next::Reconfigure(config),
                    Some(other) => drop_while_disconnected(other),
                },

                _ = &mut sleep => return Next::ConnectNow,
            }
        }
    }

    /// Nothing to connect to. Wait for a new configuration or a manual
    /// reconnect.
    async fn idle(&mut self) -> Next {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Next::Shutdown,

                req = self.requests.recv() => match req {
                    None => return Next::Shutdown,
                    Some(Request::Reconnect) => return Next::ConnectNow,
                    Some(Request::Reconfigure(config)) => return Next::Reconfigure(config),
                    Some(other) => drop_while_disconnected(other),
                },
            }
        }
    }

    async fn restart_telemetry(&mut self) {
        if let Some(task) = self.telemetry.take() {
            task.stop().await;
        }
        let Some(telemetry) = &self.config.telemetry else {
            return;
        };
        match UdpTransport::bind_port(telemetry.port).await {
            Ok(socket) => {
                self.telemetry = Some(telemetry::spawn_telemetry(
                    socket,
                    Arc::clone(&self.state),
                    self.events.clone(),
                ));
            }
            Err(e) => warn!(port = telemetry.port, error = %e, "Telemetry receiver unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn drop_while_disconnected(request: Request) {
    match request {
        Request::Submit(command) => {
            warn!(command = %command.payload(), "Codec not connected, command dropped");
        }
        Request::RefreshNow | Request::RefreshDebounced => {
            debug!("Codec not connected, refresh skipped");
        }
        Request::Reconnect | Request::Reconfigure(_) => {}
    }
}

fn periodic(period: std::time::Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
