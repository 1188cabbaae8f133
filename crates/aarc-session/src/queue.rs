//! Outbound command queue with query de-duplication and fixed spacing.
//!
//! The queue itself does no I/O. The session's IO task asks it for the
//! next due command ([`CommandQueue::pop_due`]), transmits it, and records
//! the attempt ([`CommandQueue::record_attempt`]) whatever the outcome. The
//! next command becomes due one spacing interval later. There is no reply
//! correlation and no retry.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::time::Instant;

/// Line terminator appended to every transmitted command.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Whether a command only reads device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Idempotent status/configuration read. Duplicates are dropped.
    Query,
    /// State-changing request. Always queued.
    Mutation,
}

/// A single command string awaiting transmission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutboundCommand {
    payload: String,
    kind: CommandKind,
}

impl OutboundCommand {
    /// A command that is de-duplicated while pending.
    pub fn query(payload: impl Into<String>) -> Self {
        Self::new(payload.into(), CommandKind::Query)
    }

    /// A command that is always queued.
    pub fn mutation(payload: impl Into<String>) -> Self {
        Self::new(payload.into(), CommandKind::Mutation)
    }

    /// Build a command from raw text, inferring its kind.
    ///
    /// `ATI`, the `AT&V` family, `AT#SUP` and anything ending in `?` are
    /// queries. Everything else is treated as a mutation.
    pub fn classify(payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let text = payload.trim();
        let upper = text.to_ascii_uppercase();
        let is_query = upper == "ATI"
            || upper.starts_with("AT&V")
            || upper == "AT#SUP"
            || text.ends_with('?');
        let kind = if is_query {
            CommandKind::Query
        } else {
            CommandKind::Mutation
        };
        Self::new(payload, kind)
    }

    fn new(payload: String, kind: CommandKind) -> Self {
        // A stray terminator inside the payload would smuggle a second
        // command onto the wire.
        let payload: String = payload
            .trim()
            .chars()
            .filter(|c| *c != '\r' && *c != '\n')
            .collect();
        OutboundCommand { payload, kind }
    }

    /// The command text, without terminator.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn is_query(&self) -> bool {
        self.kind == CommandKind::Query
    }

    /// Wire bytes: payload followed by CR/LF.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.payload.len() + TERMINATOR.len());
        buf.put_slice(self.payload.as_bytes());
        buf.put_slice(TERMINATOR);
        buf.to_vec()
    }
}

/// FIFO of pending commands, drained one at a time at a fixed pace.
#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<OutboundCommand>,
    spacing: Duration,
    /// Earliest instant the next transmission may happen.
    next_slot: Option<Instant>,
}

impl CommandQueue {
    pub fn new(spacing: Duration) -> Self {
        CommandQueue {
            pending: VecDeque::new(),
            spacing,
            next_slot: None,
        }
    }

    /// Append a command.
    ///
    /// Returns `false` if it was a query already pending verbatim, in which
    /// case nothing is added.
    pub fn submit(&mut self, command: OutboundCommand) -> bool {
        if command.is_query() && self.pending.contains(&command) {
            tracing::trace!(command = %command.payload, "Query already pending, dropped");
            return false;
        }
        tracing::trace!(
            command = %command.payload,
            depth = self.pending.len() + 1,
            "Command queued"
        );
        self.pending.push_back(command);
        true
    }

    /// When the head of the queue may be sent, or `None` if the queue is
    /// empty.
    pub fn next_due(&self) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        Some(self.next_slot.unwrap_or_else(Instant::now))
    }

    /// Pop the head if the spacing interval since the last attempt has
    /// elapsed at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<OutboundCommand> {
        if self.next_slot.is_some_and(|slot| now < slot) {
            return None;
        }
        self.pending.pop_front()
    }

    /// Record a transmission attempt made at `now`, successful or not.
    pub fn record_attempt(&mut self, now: Instant) {
        self.next_slot = Some(now + self.spacing);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending commands in transmission order.
    pub fn iter(&self) -> impl Iterator<Item = &OutboundCommand> {
        self.pending.iter()
    }

    /// Discard every pending command. The spacing slot is kept.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
