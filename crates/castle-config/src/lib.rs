//! Shared configuration for the Castle desktop agent.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then an
//! optional TOML file (`--config-path` or `CASTLE_CONFIG_PATH`), then
//! `CASTLE_*` environment variables, then command-line flags. The resolved
//! [`Config`] is read-only for the lifetime of the agent.

mod broker;
mod defaults;
mod logging;
mod topics;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use broker::{BrokerEndpoint, BrokerParseError, BrokerTransport};
pub use defaults::{
    CLIENT_ID_PREFIX, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PATH, DEFAULT_BROKER_PORT,
    DEFAULT_KEEP_ALIVE_SECS, DEFAULT_LOG_FILTER, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_REQUEST_TOPIC, DEFAULT_RESPONSE_TOPIC, DEFAULT_SHELL_MAX_OUTPUT_BYTES,
    DEFAULT_SHELL_TIMEOUT_SECS, DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_STATUS_TOPIC,
    default_broker_host, default_broker_path, default_broker_port, default_broker_transport,
    default_log_filter, default_log_filter_string, default_log_format, default_request_topic,
    default_response_topic, default_status_topic, derived_client_id,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use topics::Topics;

/// Resolved agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CASTLE")]
pub struct Config {
    /// Host name of the message broker.
    #[ortho_config(default = default_broker_host())]
    pub broker_host: String,
    /// Port of the message broker.
    #[ortho_config(default = DEFAULT_BROKER_PORT)]
    pub broker_port: u16,
    /// Framing used to reach the broker.
    #[ortho_config(default = default_broker_transport())]
    pub broker_transport: BrokerTransport,
    /// WebSocket path on the broker.
    #[ortho_config(default = default_broker_path())]
    pub broker_path: String,
    /// Explicit client identifier; derived from the process id when unset.
    pub client_id: Option<String>,
    /// Topic subscribed to for inbound requests.
    #[ortho_config(default = default_request_topic())]
    pub request_topic: String,
    /// Topic carrying responses and errors.
    #[ortho_config(default = default_response_topic())]
    pub response_topic: String,
    /// Retained topic carrying status announcements.
    #[ortho_config(default = default_status_topic())]
    pub status_topic: String,
    /// MQTT keep-alive interval in seconds.
    #[ortho_config(default = DEFAULT_KEEP_ALIVE_SECS)]
    pub keep_alive_secs: u64,
    /// Pause between reconnect attempts in milliseconds.
    #[ortho_config(default = DEFAULT_RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,
    /// Upper bound on waiting for the offline status during shutdown.
    #[ortho_config(default = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,
    /// Default timeout applied to shell commands, in seconds.
    #[ortho_config(default = DEFAULT_SHELL_TIMEOUT_SECS)]
    pub shell_timeout_secs: u64,
    /// Cap on captured shell output per stream, in bytes.
    #[ortho_config(default = DEFAULT_SHELL_MAX_OUTPUT_BYTES)]
    pub shell_max_output_bytes: usize,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            broker_transport: default_broker_transport(),
            broker_path: default_broker_path(),
            client_id: None,
            request_topic: default_request_topic(),
            response_topic: default_response_topic(),
            status_topic: default_status_topic(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            shell_timeout_secs: DEFAULT_SHELL_TIMEOUT_SECS,
            shell_max_output_bytes: DEFAULT_SHELL_MAX_OUTPUT_BYTES,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer is malformed.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first element is treated as the program name.
    ///
    /// # Errors
    ///
    /// Returns the aggregated loader error when any layer is malformed.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Location of the message broker.
    #[must_use]
    pub fn broker(&self) -> BrokerEndpoint {
        match self.broker_transport {
            BrokerTransport::WebSocket => {
                BrokerEndpoint::websocket(&self.broker_host, self.broker_port, &self.broker_path)
            }
            BrokerTransport::Tcp => BrokerEndpoint::tcp(&self.broker_host, self.broker_port),
        }
    }

    /// Topic names used on the bus.
    #[must_use]
    pub fn topics(&self) -> Topics {
        Topics::new(
            &self.request_topic,
            &self.response_topic,
            &self.status_topic,
        )
    }

    /// Client identifier presented to the broker.
    ///
    /// Blank configured values fall back to the derived identifier.
    #[must_use]
    pub fn client_id(&self) -> String {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(derived_client_id, str::to_owned)
    }

    /// MQTT keep-alive interval.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Pause between reconnect attempts.
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Upper bound on waiting for the offline status during shutdown.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Default timeout applied to shell commands.
    #[must_use]
    pub const fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }

    /// Cap on captured shell output per stream.
    #[must_use]
    pub const fn shell_max_output_bytes(&self) -> usize {
        self.shell_max_output_bytes
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
