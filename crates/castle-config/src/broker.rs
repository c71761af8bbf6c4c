use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use url::Url;

/// Framing used on the connection to the message broker.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BrokerTransport {
    /// MQTT carried over a WebSocket connection.
    #[default]
    #[strum(to_string = "websocket", serialize = "ws")]
    #[serde(rename = "websocket", alias = "ws")]
    WebSocket,
    /// MQTT over a plain TCP connection.
    Tcp,
}

/// Resolved location of the message broker.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BrokerEndpoint {
    /// Framing used to reach the broker.
    pub transport: BrokerTransport,
    /// Host name or address of the broker.
    pub host: String,
    /// Port the broker listens on.
    pub port: u16,
    /// WebSocket path; ignored for TCP framing.
    pub path: String,
}

impl BrokerEndpoint {
    /// Builds a WebSocket endpoint.
    #[must_use]
    pub fn websocket(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            transport: BrokerTransport::WebSocket,
            host: host.into(),
            port,
            path: normalise_path(path.into()),
        }
    }

    /// Builds a TCP endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: BrokerTransport::Tcp,
            host: host.into(),
            port,
            path: String::from("/"),
        }
    }

    /// Returns `true` when the endpoint uses WebSocket framing.
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        self.transport == BrokerTransport::WebSocket
    }
}

fn normalise_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            BrokerTransport::WebSocket => write!(
                formatter,
                "ws://{}:{}{}",
                self.host, self.port, self.path
            ),
            BrokerTransport::Tcp => write!(formatter, "tcp://{}:{}", self.host, self.port),
        }
    }
}

impl FromStr for BrokerEndpoint {
    type Err = BrokerParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        let transport = match url.scheme() {
            "ws" => BrokerTransport::WebSocket,
            "tcp" | "mqtt" => BrokerTransport::Tcp,
            other => return Err(BrokerParseError::UnsupportedScheme(other.to_owned())),
        };
        let host = url
            .host_str()
            .ok_or_else(|| BrokerParseError::MissingHost(input.to_owned()))?;
        // `ws` has a known default port; `tcp` and `mqtt` do not.
        let port = url
            .port_or_known_default()
            .ok_or_else(|| BrokerParseError::MissingPort(input.to_owned()))?;
        match transport {
            BrokerTransport::WebSocket => Ok(Self::websocket(host, port, url.path())),
            BrokerTransport::Tcp => Ok(Self::tcp(host, port)),
        }
    }
}

/// Errors encountered while parsing a [`BrokerEndpoint`] from text.
#[derive(Debug, Error)]
pub enum BrokerParseError {
    /// Scheme was not recognised.
    #[error("unsupported broker scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing broker host in '{0}'")]
    MissingHost(String),
    /// Port was missing from the address.
    #[error("missing broker port in '{0}'")]
    MissingPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
