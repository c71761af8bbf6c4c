//! Defines the error surface for agent launch and supervision.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::transport::TransportError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the agent.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the agent failed.
    #[error("agent bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Encoding the last-will status failed.
    #[error("failed to encode last-will status: {source}")]
    LastWill {
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },
    /// Opening or starting the broker session failed.
    #[error("broker session failed: {source}")]
    Session {
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<TransportError> for LaunchError {
    fn from(source: TransportError) -> Self {
        Self::Session { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
