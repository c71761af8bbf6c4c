//! Structured health reporting for agent lifecycle events.

use std::sync::Arc;

use castle_config::Config;

use crate::bootstrap::BootstrapError;
use crate::envelope::AgentStatus;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the operation registry is complete.
    fn registry_populated(&self, operations: &[String]);

    /// Invoked each time the broker accepts the session.
    fn session_connected(&self);

    /// Invoked when the session drops and a reconnect is pending.
    fn session_disconnected(&self, reason: &str);

    /// Invoked after a status envelope has been queued for delivery.
    fn status_published(&self, status: AgentStatus);

    /// Invoked when the first stop request begins tearing the agent down.
    fn shutdown_starting(&self);

    /// Invoked after the session has been closed.
    fn shutdown_completed(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn registry_populated(&self, operations: &[String]) {
        (**self).registry_populated(operations);
    }

    fn session_connected(&self) {
        (**self).session_connected();
    }

    fn session_disconnected(&self, reason: &str) {
        (**self).session_disconnected(reason);
    }

    fn status_published(&self, status: AgentStatus) {
        (**self).status_published(status);
    }

    fn shutdown_starting(&self) {
        (**self).shutdown_starting();
    }

    fn shutdown_completed(&self) {
        (**self).shutdown_completed();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting agent bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            broker = %config.broker(),
            client_id = %config.client_id(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "agent bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "agent bootstrap failed"
        );
    }

    fn registry_populated(&self, operations: &[String]) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "registry_populated",
            count = operations.len(),
            operations = ?operations,
            "operation registry ready"
        );
    }

    fn session_connected(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "session_connected",
            "connected to broker"
        );
    }

    fn session_disconnected(&self, reason: &str) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "session_disconnected",
            reason,
            "lost broker connection"
        );
    }

    fn status_published(&self, status: AgentStatus) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "status_published",
            status = status.as_str(),
            "status announced"
        );
    }

    fn shutdown_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_starting",
            "stopping agent"
        );
    }

    fn shutdown_completed(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_completed",
            "agent stopped"
        );
    }
}
