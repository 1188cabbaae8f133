//! Session configuration and its fluent builder.
//!
//! # Example
//!
//! ```
//! use aarc_session::config::{SessionConfig, TelemetryConfig};
//! use std::time::Duration;
//!
//! # fn example() -> aarc_core::Result<()> {
//! let config = SessionConfig::builder()
//!     .host("192.168.1.50")
//!     .password("secret")
//!     .polling(Some(Duration::from_secs(10)))
//!     .telemetry(TelemetryConfig::new("192.168.1.10", 5000, Duration::from_millis(200)))
//!     .build()?;
//! assert_eq!(config.port, 2000);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use aarc_core::error::{Error, Result};

/// Default AARC command port.
pub const DEFAULT_PORT: u16 = 2000;

/// Everything a session needs to reach and drive one codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Codec address. `None` leaves the session in the `bad-config` phase.
    pub host: Option<String>,
    /// Codec command port.
    pub port: u16,
    /// Sent on every connect, even when empty.
    pub password: String,
    /// Period of the status battery while ready. `None` disables polling.
    pub polling: Option<Duration>,
    /// Period of `AT#VU=1` level polls while ready. `None` disables them.
    pub vu_polling: Option<Duration>,
    /// When set, the codec is asked to stream levels to this target.
    pub telemetry: Option<TelemetryConfig>,
    /// Minimum gap between two transmitted commands.
    pub command_spacing: Duration,
    /// Delay before reconnecting after a close or failure.
    pub reconnect_delay: Duration,
    /// Limit on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Quiet period for [`refresh_debounced`](crate::CodecHandle::refresh_debounced).
    pub refresh_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            host: None,
            port: DEFAULT_PORT,
            password: String::new(),
            polling: Some(Duration::from_secs(5)),
            vu_polling: None,
            telemetry: None,
            command_spacing: Duration::from_millis(100),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            refresh_debounce: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    /// Start a builder with every field at its default.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// The configured host, if it is non-blank.
    pub fn target_host(&self) -> Option<&str> {
        self.host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }
}

/// Where the codec should send level datagrams, and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Address the codec sends to (this machine, as seen from the codec).
    pub target_host: String,
    /// UDP port, both the codec's target and our local bind port.
    pub port: u16,
    /// Reporting period.
    pub period: Duration,
}

impl TelemetryConfig {
    pub fn new(target_host: &str, port: u16, period: Duration) -> Self {
        TelemetryConfig {
            target_host: target_host.to_string(),
            port,
            period,
        }
    }
}

/// Fluent builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the codec host name or IP address.
    pub fn host(mut self, host: &str) -> Self {
        self.config.host = Some(host.to_string());
        self
    }

    /// Set the command port (default: 2000).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the password sent with `AT#PWD` (default: empty).
    pub fn password(mut self, password: &str) -> Self {
        self.config.password = password.to_string();
        self
    }

    /// Set the status polling period, or `None` to disable (default: 5s).
    pub fn polling(mut self, period: Option<Duration>) -> Self {
        self.config.polling = period;
        self
    }

    /// Set the VU polling period, or `None` to disable (default: disabled).
    pub fn vu_polling(mut self, period: Option<Duration>) -> Self {
        self.config.vu_polling = period;
        self
    }

    /// Ask the codec to stream level telemetry.
    pub fn telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.config.telemetry = Some(telemetry);
        self
    }

    /// Set the gap between transmitted commands (default: 100ms).
    pub fn command_spacing(mut self, spacing: Duration) -> Self {
        self.config.command_spacing = spacing;
        self
    }

    /// Set the delay before a reconnect attempt (default: 5s).
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set the TCP connect timeout (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the quiet period used by debounced refreshes (default: 1s).
    pub fn refresh_debounce(mut self, debounce: Duration) -> Self {
        self.config.refresh_debounce = debounce;
        self
    }

    /// Validate and return the configuration.
    ///
    /// A missing host is not an error here: the session reports it as the
    /// `bad-config` phase instead. A host that cannot be dialled as given
    /// (embedded whitespace, or a `host:port` pair) is rejected with
    /// [`Error::BadConfig`].
    pub fn build(self) -> Result<SessionConfig> {
        let config = self.config;

        if let Some(host) = config.target_host() {
            if host.contains(char::is_whitespace) {
                return Err(Error::BadConfig(format!(
                    "host {host:?} contains whitespace"
                )));
            }
            if host.matches(':').count() == 1 {
                return Err(Error::BadConfig(format!(
                    "host {host:?} includes a port, set it with port() instead"
                )));
            }
        }

        if config.port == 0 {
            return Err(Error::InvalidParameter("port must be non-zero".into()));
        }
        if config.polling.is_some_and(|p| p.is_zero()) {
            return Err(Error::InvalidParameter(
                "polling period must be non-zero".into(),
            ));
        }
        if config.vu_polling.is_some_and(|p| p.is_zero()) {
            return Err(Error::InvalidParameter(
                "VU polling period must be non-zero".into(),
            ));
        }
        if let Some(telemetry) = &config.telemetry {
            if telemetry.port == 0 {
                return Err(Error::InvalidParameter(
                    "telemetry port must be non-zero".into(),
                ));
            }
            if telemetry.target_host.trim().is_empty() {
                return Err(Error::InvalidParameter(
                    "telemetry target host is required".into(),
                ));
            }
            if telemetry.period.is_zero() {
                return Err(Error::InvalidParameter(
                    "telemetry period must be non-zero".into(),
                ));
            }
        }

        Ok(config)
    }
}
