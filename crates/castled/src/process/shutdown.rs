//! Blocking wait for the operator's request to stop the agent.
//!
//! The launch sequence parks the main thread here once the broker session is
//! running. Returning from [`ShutdownSignal::wait`] starts the offline
//! announcement and session teardown, whether or not a signal arrived.

use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use signal_hook::low_level::signal_name;
use thiserror::Error;
use tracing::{info, warn};

use super::PROCESS_TARGET;

/// Signals that stop the agent. SIGHUP covers a closed controlling terminal.
pub const STOP_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Source of the agent's stop request.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until the agent should stop.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when no listener could be installed; the
    /// caller still stops the agent.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Failures of a [`ShutdownSignal`].
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The operating system refused the signal handlers.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for one of [`STOP_SIGNALS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds a signal listener. Handlers are installed on the first wait.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals =
            Signals::new(STOP_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        match signals.forever().next() {
            Some(signal) => info!(
                target: PROCESS_TARGET,
                signal = describe(signal),
                "stop signal received"
            ),
            None => warn!(
                target: PROCESS_TARGET,
                "signal listener closed without a signal"
            ),
        }
        Ok(())
    }
}

fn describe(signal: i32) -> &'static str {
    signal_name(signal).unwrap_or("unknown")
}
