//! Test double for [`HealthReporter`] that records structured events.

use std::sync::Mutex;

use castle_config::Config;

use crate::bootstrap::BootstrapError;
use crate::envelope::AgentStatus;
use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    RegistryPopulated(Vec<String>),
    SessionConnected,
    SessionDisconnected(String),
    StatusPublished(AgentStatus),
    ShutdownStarting,
    ShutdownCompleted,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Counts recorded occurrences of `event`.
    #[must_use]
    pub fn count(&self, event: &HealthEvent) -> usize {
        self.events()
            .iter()
            .filter(|recorded| *recorded == event)
            .count()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn registry_populated(&self, operations: &[String]) {
        self.record(HealthEvent::RegistryPopulated(operations.to_vec()));
    }

    fn session_connected(&self) {
        self.record(HealthEvent::SessionConnected);
    }

    fn session_disconnected(&self, reason: &str) {
        self.record(HealthEvent::SessionDisconnected(reason.to_owned()));
    }

    fn status_published(&self, status: AgentStatus) {
        self.record(HealthEvent::StatusPublished(status));
    }

    fn shutdown_starting(&self) {
        self.record(HealthEvent::ShutdownStarting);
    }

    fn shutdown_completed(&self) {
        self.record(HealthEvent::ShutdownCompleted);
    }
}
