//! UDP level-meter telemetry.
//!
//! When telemetry is configured the codec pushes short ASCII datagrams to
//! this host. Two shapes are understood:
//!
//! - `$BAR=a,b,c,d`: four attenuation values. `99` means silence and maps
//!   to [`SILENCE_FLOOR_DB`]; anything else is negated into dB.
//! - `#VU=in,out`: the legacy input/output pair, already in dB.
//!
//! Anything else is dropped. Decoded reports are folded into the session
//! snapshot and announced as [`CodecEvent::LevelsChanged`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use aarc_core::error::Error;
use aarc_core::events::CodecEvent;
use aarc_core::types::{LevelReport, SILENCE_FLOOR_DB};
use aarc_transport::UdpTransport;

use crate::session::{SessionSnapshot, publish_levels};

/// Attenuation value the codec uses for a silent channel.
const SILENCE_SENTINEL: f32 = 99.0;

/// How long one receive waits before checking for cancellation again.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Decode one telemetry datagram.
pub fn decode_datagram(datagram: &[u8]) -> Option<LevelReport> {
    let text = std::str::from_utf8(datagram).ok()?.trim();

    if let Some(fields) = text.strip_prefix("$BAR=") {
        let values: Vec<f32> = fields
            .split(',')
            .map(|f| f.trim().parse::<f32>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        let channels: [f32; 4] = values.try_into().ok()?;
        return Some(LevelReport::Channels(channels.map(attenuation_to_db)));
    }

    if let Some(fields) = text.strip_prefix("#VU=") {
        return parse_vu_pair(fields);
    }

    None
}

/// Parse the `<in>,<out>` body of a `#VU=` report.
pub fn parse_vu_pair(fields: &str) -> Option<LevelReport> {
    let (input, output) = fields.trim().split_once(',')?;
    let input = input.trim().parse::<f32>().ok()?;
    let output = output.trim().parse::<f32>().ok()?;
    if !input.is_finite() || !output.is_finite() {
        return None;
    }
    Some(LevelReport::InputOutput { input, output })
}

fn attenuation_to_db(value: f32) -> f32 {
    if value == SILENCE_SENTINEL {
        SILENCE_FLOOR_DB
    } else {
        -value
    }
}

/// A running telemetry receiver.
#[derive(Debug)]
pub struct TelemetryTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: std::net::SocketAddr,
}

impl TelemetryTask {
    /// The address the receiver is bound to.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stop the receiver and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

/// Start decoding datagrams arriving on `socket` into `state`.
pub fn spawn_telemetry(
    socket: UdpTransport,
    state: Arc<watch::Sender<SessionSnapshot>>,
    events: broadcast::Sender<CodecEvent>,
) -> TelemetryTask {
    let local_addr = socket.local_addr();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    debug!(local_addr = %local_addr, "Telemetry receiver started");
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            tokio::select! {
                biased;

                _ = task_cancel.cancelled() => {
                    debug!(local_addr = %local_addr, "Telemetry receiver stopped");
                    break;
                }

                received = socket.recv_from(&mut buf, RECV_TIMEOUT) => match received {
                    Ok((n, src)) => match decode_datagram(&buf[..n]) {
                        Some(report) => publish_levels(&state, &events, report),
                        None => trace!(remote = %src, bytes = n, "Ignoring malformed datagram"),
                    },
                    Err(Error::Timeout) => {}
                    Err(e) => {
                        warn!(error = %e, "Telemetry receive failed");
                        tokio::time::sleep(RECV_TIMEOUT).await;
                    }
                },
            }
        }
    });

    TelemetryTask {
        cancel,
        handle,
        local_addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_datagram_maps_silence_and_negates() {
        assert_eq!(
            decode_datagram(b"$BAR=99,10,10,10"),
            Some(LevelReport::Channels([SILENCE_FLOOR_DB, -10.0, -10.0, -10.0]))
        );
        assert_eq!(
            decode_datagram(b"$BAR=3,0,12.5,99\r\n"),
            Some(LevelReport::Channels([-3.0, 0.0, -12.5, SILENCE_FLOOR_DB]))
        );
    }

    #[test]
    fn legacy_vu_datagram() {
        assert_eq!(
            decode_datagram(b"#VU=-12,-18"),
            Some(LevelReport::InputOutput {
                input: -12.0,
                output: -18.0
            })
        );
    }

    #[test]
    fn malformed_datagrams_are_ignored() {
        assert_eq!(decode_datagram(b"$BAR=1,2,3"), None);
        assert_eq!(decode_datagram(b"$BAR=1,2,3,4,5"), None);
        assert_eq!(decode_datagram(b"$BAR=1,x,3,4"), None);
        assert_eq!(decode_datagram(b"#VU=-12"), None);
        assert_eq!(decode_datagram(b"#VU=NaN,1"), None);
        assert_eq!(decode_datagram(b"hello"), None);
        assert_eq!(decode_datagram(&[0xff, 0xfe]), None);
    }

    #[tokio::test]
    async fn receiver_updates_snapshot_and_emits() {
        let state = Arc::new(watch::Sender::new(SessionSnapshot::default()));
        let (events, mut rx) = broadcast::channel(16);
        let socket = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let task = spawn_telemetry(socket, Arc::clone(&state), events);

        let codec = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        codec.send_to(b"garbage", task.local_addr()).await.unwrap();
        codec
            .send_to(b"$BAR=99,10,20,30", task.local_addr())
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let expected = [SILENCE_FLOOR_DB, -10.0, -20.0, -30.0];
        match event {
            CodecEvent::LevelsChanged(levels) => assert_eq!(levels.channels, expected),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(state.borrow().levels.channels, expected);

        task.stop().await;
    }
}
