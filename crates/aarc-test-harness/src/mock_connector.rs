//! Scripted [`Connector`] for reconnect-supervisor tests.
//!
//! Each connection attempt pops the next scripted outcome: a ready
//! [`MockTransport`] or an error. When the script runs out, attempts fail
//! with a transport error. Attempt instants are recorded so tests can check
//! reconnect spacing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use aarc_core::error::{Error, Result};
use aarc_core::transport::{Connector, Transport};

use crate::mock_transport::MockTransport;

#[derive(Debug, Default)]
struct Script {
    outcomes: VecDeque<Result<MockTransport>>,
    attempts: Vec<(Instant, String, u16)>,
}

/// A connector whose outcomes are scripted by the test.
///
/// Cloning shares the script, so a test can keep one clone after handing
/// another to the supervisor.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    script: Arc<Mutex<Script>>,
}

impl MockConnector {
    /// Create a connector with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next attempt to succeed with `transport`.
    pub fn push_transport(&self, transport: MockTransport) {
        self.lock().outcomes.push_back(Ok(transport));
    }

    /// Script the next attempt to fail with `error`.
    pub fn push_failure(&self, error: Error) {
        self.lock().outcomes.push_back(Err(error));
    }

    /// Instants of every attempt so far.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.iter().map(|(at, _, _)| *at).collect()
    }

    /// Number of attempts so far.
    pub fn attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    /// `host:port` targets of every attempt so far.
    pub fn targets(&self) -> Vec<String> {
        self.lock()
            .attempts
            .iter()
            .map(|(_, host, port)| format!("{host}:{port}"))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<Box<dyn Transport>> {
        let outcome = {
            let mut script = self.lock();
            script.attempts.push((Instant::now(), host.to_string(), port));
            script.outcomes.pop_front()
        };
        match outcome {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(e)) => Err(e),
            None => Err(Error::Transport(format!(
                "connection refused: {host}:{port}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcomes_are_consumed_in_order() {
        let connector = MockConnector::new();
        let (transport, _peer) = MockTransport::pair();
        connector.push_failure(Error::Timeout);
        connector.push_transport(transport);

        let first = connector
            .connect("codec", 2000, Duration::from_secs(1))
            .await;
        assert!(matches!(first, Err(Error::Timeout)));

        let second = connector
            .connect("codec", 2000, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(second.is_connected());

        let third = connector
            .connect("codec", 2000, Duration::from_secs(1))
            .await;
        assert!(matches!(third, Err(Error::Transport(_))));

        assert_eq!(connector.attempts(), 3);
        assert_eq!(connector.targets()[0], "codec:2000");
    }
}
