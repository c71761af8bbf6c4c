use std::process;

use crate::broker::BrokerTransport;
use crate::logging::LogFormat;

/// Default broker host name.
pub const DEFAULT_BROKER_HOST: &str = "localhost";

/// Default broker port.
pub const DEFAULT_BROKER_PORT: u16 = 1893;

/// Default WebSocket path on the broker.
pub const DEFAULT_BROKER_PATH: &str = "/";

/// Default topic the agent subscribes to for inbound requests.
pub const DEFAULT_REQUEST_TOPIC: &str = "castle/desktop/request";

/// Default topic carrying responses and errors.
pub const DEFAULT_RESPONSE_TOPIC: &str = "castle/desktop/response";

/// Default retained topic carrying the agent status.
pub const DEFAULT_STATUS_TOPIC: &str = "castle/desktop/status";

/// Default MQTT keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;

/// Default pause between reconnect attempts in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Default upper bound on waiting for the offline status to be acknowledged.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

/// Default timeout for shell commands in seconds.
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 30;

/// Default cap on captured shell output, per stream, in bytes.
pub const DEFAULT_SHELL_MAX_OUTPUT_BYTES: usize = 65_536;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Prefix for client identifiers derived from the process id.
pub const CLIENT_ID_PREFIX: &str = "castle_desktop_";

/// Default broker host name as an owned value.
#[must_use]
pub fn default_broker_host() -> String {
    DEFAULT_BROKER_HOST.to_owned()
}

/// Default broker port.
#[must_use]
pub const fn default_broker_port() -> u16 {
    DEFAULT_BROKER_PORT
}

/// Default framing used to reach the broker.
#[must_use]
pub const fn default_broker_transport() -> BrokerTransport {
    BrokerTransport::WebSocket
}

/// Default WebSocket path as an owned value.
#[must_use]
pub fn default_broker_path() -> String {
    DEFAULT_BROKER_PATH.to_owned()
}

/// Default request topic as an owned value.
#[must_use]
pub fn default_request_topic() -> String {
    DEFAULT_REQUEST_TOPIC.to_owned()
}

/// Default response topic as an owned value.
#[must_use]
pub fn default_response_topic() -> String {
    DEFAULT_RESPONSE_TOPIC.to_owned()
}

/// Default status topic as an owned value.
#[must_use]
pub fn default_status_topic() -> String {
    DEFAULT_STATUS_TOPIC.to_owned()
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Derives a client identifier unique to the running process.
#[must_use]
pub fn derived_client_id() -> String {
    format!("{CLIENT_ID_PREFIX}{}", process::id())
}
