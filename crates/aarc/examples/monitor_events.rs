//! Monitor codec events.
//!
//! Connects to a codec, then prints every event for 60 seconds: phase
//! transitions, call state changes, parameter reports, device errors and
//! level updates.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p aarc --example monitor_events -- 192.168.1.50 secret
//! ```

use std::time::Duration;

use aarc::{CodecEvent, SessionConfig, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "192.168.1.50".to_string());
    let password = args.next().unwrap_or_default();

    let config = SessionConfig::builder()
        .host(&host)
        .password(&password)
        .telemetry(TelemetryConfig::new("192.168.1.10", 9000, Duration::from_millis(200)))
        .build()?;

    println!("Connecting to {}...", host);
    let codec = aarc::connect(config);
    let mut events = codec.subscribe();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let start = tokio::time::Instant::now();

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                let elapsed = start.elapsed();
                let timestamp = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());

                match event {
                    CodecEvent::PhaseChanged { from, to } => {
                        println!("{} Phase             {} -> {}", timestamp, from, to);
                    }
                    CodecEvent::CallStateChanged(state) => {
                        println!("{} Call              -> {}", timestamp, state);
                    }
                    CodecEvent::ParameterChanged { key, value } => {
                        println!("{} Parameter         {} = {}", timestamp, key, value);
                    }
                    CodecEvent::DeviceError(error) => {
                        println!("{} DeviceError       {}", timestamp, error);
                    }
                    CodecEvent::LevelsChanged(levels) => {
                        println!(
                            "{} Levels            {:?} in {:.1} out {:.1} dB",
                            timestamp, levels.channels, levels.input, levels.output
                        );
                    }
                    CodecEvent::Reconnecting { attempt } => {
                        println!("{} Reconnecting      attempt {}", timestamp, attempt);
                    }
                }
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("(missed {} events due to lag)", n);
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => break,
        }
    }

    codec.shutdown().await?;
    println!("\nMonitoring complete.");
    Ok(())
}
