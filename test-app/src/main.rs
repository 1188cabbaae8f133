// aarc command-line tool -- connect to an AARC codec, watch what it
// reports, and push raw commands at it.
//
// Usage:
//   aarc-cli --host 192.168.1.50 --password secret monitor --duration 60
//   aarc-cli --host 192.168.1.50 status
//   aarc-cli --host 192.168.1.50 send "AT#COD1?" --wait 3
//   aarc-cli --mock status
//   aarc-cli params
//
// Telemetry:
//   aarc-cli --host 192.168.1.50 --telemetry-host 192.168.1.10 \
//       --telemetry-port 9000 --telemetry-period-ms 200 levels --duration 30

mod mock;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use aarc::session::params;
use aarc::{CodecEvent, CodecHandle, ConnectionPhase, SessionConfig, TelemetryConfig};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// aarc command-line tool -- monitors and drives AARC codecs.
#[derive(Parser)]
#[command(name = "aarc-cli", version, about)]
struct Cli {
    /// Codec host name or IP address.
    /// Required for all commands except `params` unless --mock is used.
    #[arg(long)]
    host: Option<String>,

    /// Codec TCP control port.
    #[arg(long, default_value_t = aarc::DEFAULT_PORT)]
    port: u16,

    /// Password sent with AT#PWD after connecting.
    #[arg(long, default_value = "")]
    password: String,

    /// Status polling period in seconds (0 disables polling).
    #[arg(long, default_value_t = 5)]
    poll_secs: u64,

    /// Poll AT#VU=1 at this period in milliseconds.
    #[arg(long)]
    vu_poll_ms: Option<u64>,

    /// Address the codec should send level datagrams to (this machine).
    #[arg(long, requires = "telemetry_port")]
    telemetry_host: Option<String>,

    /// UDP port for level datagrams.
    #[arg(long, requires = "telemetry_host")]
    telemetry_port: Option<u16>,

    /// Telemetry reporting period in milliseconds.
    #[arg(long, default_value_t = 200)]
    telemetry_period_ms: u64,

    /// Run against an in-process scripted codec instead of real hardware.
    #[arg(long, conflicts_with = "host")]
    mock: bool,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Subscribe to codec events and print them in real time.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// Wait for the codec, refresh its status and print the snapshot.
    Status {
        /// Seconds to wait for the status battery to be answered.
        #[arg(long, default_value_t = 3)]
        wait: u64,
    },

    /// Send one raw command and print the events it produces.
    Send {
        /// Command text, e.g. "AT#COD1?" or "AT#NET=1".
        command: String,

        /// Seconds to keep printing events after sending.
        #[arg(long, default_value_t = 2)]
        wait: u64,
    },

    /// Print the audio level table as it updates.
    Levels {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,
    },

    /// List every parameter mnemonic the client decodes.
    Params,
}

/// How long to wait for the session to become ready.
const READY_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_config(cli: &Cli, host: &str, port: u16, password: &str) -> Result<SessionConfig> {
    let polling = (cli.poll_secs > 0).then(|| Duration::from_secs(cli.poll_secs));
    let mut builder = SessionConfig::builder()
        .host(host)
        .port(port)
        .password(password)
        .polling(polling)
        .vu_polling(cli.vu_poll_ms.map(Duration::from_millis));

    if let (Some(target), Some(udp_port)) = (&cli.telemetry_host, cli.telemetry_port) {
        builder = builder.telemetry(TelemetryConfig::new(
            target,
            udp_port,
            Duration::from_millis(cli.telemetry_period_ms),
        ));
    }

    builder.build().context("invalid session configuration")
}

/// Wait until the session reports ready, or fail after `timeout`.
async fn wait_ready(codec: &CodecHandle, timeout: Duration) -> Result<()> {
    let mut state = codec.watch();
    tokio::time::timeout(timeout, state.wait_for(|s| s.phase.is_ready()))
        .await
        .with_context(|| format!("codec not ready after {}s (phase: {})", timeout.as_secs(), codec.phase()))?
        .context("session stopped")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_monitor(codec: &CodecHandle, duration_secs: u64) -> Result<()> {
    let mut event_rx = codec.subscribe();

    println!("Monitoring codec events (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let timeout = match deadline {
            Some(dl) => {
                let remaining = dl.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    println!("Monitor duration elapsed.");
                    break;
                }
                remaining
            }
            None => Duration::from_secs(3600),
        };

        match tokio::time::timeout(timeout, event_rx.recv()).await {
            Ok(Ok(event)) => print_event(&event),
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(n))) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => {
                if deadline.is_some() {
                    println!("Monitor duration elapsed.");
                }
                break;
            }
        }
    }

    Ok(())
}

fn print_event(event: &CodecEvent) {
    match event {
        CodecEvent::PhaseChanged { from, to } => println!("[phase] {from} -> {to}"),
        CodecEvent::CallStateChanged(state) => println!("[call] {state}"),
        CodecEvent::ParameterChanged { key, value } => println!("[param] {key} = {value}"),
        CodecEvent::DeviceError(error) => println!("[error] {error}"),
        CodecEvent::LevelsChanged(levels) => println!(
            "[levels] {:?} in {:.1} out {:.1} dB",
            levels.channels, levels.input, levels.output
        ),
        CodecEvent::Reconnecting { attempt } => println!("[reconnect] attempt {attempt}"),
    }
}

async fn cmd_status(codec: &CodecHandle, wait_secs: u64) -> Result<()> {
    wait_ready(codec, READY_TIMEOUT).await?;
    codec.refresh_now().await?;
    tokio::time::sleep(Duration::from_secs(wait_secs)).await;

    let snapshot = codec.snapshot();
    println!("Phase:       {}", snapshot.phase);
    println!("Call state:  {}", snapshot.call_state);
    println!(
        "Levels:      {:?} in {:.1} out {:.1} dB",
        snapshot.levels.channels, snapshot.levels.input, snapshot.levels.output
    );
    println!();

    let known: Vec<_> = snapshot
        .parameters
        .iter()
        .filter(|(_, value)| value.is_known())
        .collect();
    if known.is_empty() {
        println!("No parameters reported yet.");
        return Ok(());
    }

    let width = known.iter().map(|(key, _)| key.len()).max().unwrap_or(8).max(8);
    println!("{:<width$}  {:<24}  Value", "Key", "Name");
    println!("{:-<width$}  {:-<24}  {:-<20}", "", "", "");
    for (key, value) in known {
        let name = params::lookup_any(key).map(|spec| spec.name).unwrap_or("");
        println!("{key:<width$}  {name:<24}  {value}");
    }

    Ok(())
}

async fn cmd_send(codec: &CodecHandle, command: &str, wait_secs: u64) -> Result<()> {
    if command.trim().is_empty() {
        bail!("command text is empty");
    }
    wait_ready(codec, READY_TIMEOUT).await?;

    let mut event_rx = codec.subscribe();
    codec
        .submit(command)
        .await
        .with_context(|| format!("failed to submit {command:?}"))?;
    println!("Sent: {command}");

    let deadline = Instant::now() + Duration::from_secs(wait_secs);
    while let Ok(Ok(event)) = tokio::time::timeout_at(deadline, event_rx.recv()).await {
        print_event(&event);
    }

    Ok(())
}

async fn cmd_levels(codec: &CodecHandle, duration_secs: u64) -> Result<()> {
    let mut state = codec.watch();
    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));

    loop {
        let changed = match deadline {
            Some(dl) => match tokio::time::timeout_at(dl, state.changed()).await {
                Ok(changed) => changed,
                Err(_) => break,
            },
            None => state.changed().await,
        };
        if changed.is_err() {
            break;
        }

        let levels = state.borrow_and_update().levels;
        let line: Vec<String> = levels
            .channels
            .iter()
            .map(|db| format!("{db:>6.1}"))
            .collect();
        print!(
            "\r[{}] in {:>6.1} out {:>6.1} dB",
            line.join(" "),
            levels.input,
            levels.output
        );
        io::stdout().flush().ok();
    }

    println!();
    Ok(())
}

fn cmd_params() -> Result<()> {
    let width = params::all().map(|spec| spec.mnemonic.len()).max().unwrap_or(8).max(8);
    println!("{:<width$}  Name", "Key");
    println!("{:-<width$}  {:-<24}", "", "");
    for spec in params::all() {
        println!("{:<width$}  {}", spec.mnemonic, spec.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // The `params` command does not require a codec.
    if matches!(cli.command, Command::Params) {
        return cmd_params();
    }

    let mut mock_server = None;
    let config = if cli.mock {
        let (server, port) = mock::start().await?;
        info!(port, "Mock codec listening");
        mock_server = Some(server);
        build_config(&cli, "127.0.0.1", port, "")?
    } else {
        let Some(host) = cli.host.as_deref() else {
            bail!("--host is required (or use --mock)");
        };
        build_config(&cli, host, cli.port, &cli.password)?
    };

    let codec = aarc::connect(config);

    let result = match &cli.command {
        Command::Monitor { duration } => cmd_monitor(&codec, *duration).await,
        Command::Status { wait } => cmd_status(&codec, *wait).await,
        Command::Send { command, wait } => cmd_send(&codec, command, *wait).await,
        Command::Levels { duration } => cmd_levels(&codec, *duration).await,
        Command::Params => unreachable!("params handled above"),
    };

    let phase = codec.phase();
    codec.shutdown().await.context("failed to stop session")?;
    if phase == ConnectionPhase::BadConfig {
        bail!("codec host is not configured");
    }

    if let Some(server) = mock_server {
        match server.wait().await {
            Ok(received) => debug!(commands = received.len(), "Mock codec finished"),
            Err(e) => debug!(error = %e, "Mock codec script incomplete"),
        }
    }

    result
}
