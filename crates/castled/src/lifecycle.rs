//! Agent start and stop sequencing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use castle_config::{Config, Topics};

use crate::dispatch::Dispatcher;
use crate::envelope::AgentStatus;
use crate::health::HealthReporter;
use crate::registry::OperationRegistry;
use crate::status::{StatusChannel, StatusPublisher};
use crate::transport::{Session, SessionHandler, TransportError};

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Settings governing a running agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Request, response, and status topics.
    pub topics: Topics,
    /// Identifier announced in status envelopes.
    pub client_id: String,
    /// Upper bound on waiting for the offline status to be acknowledged.
    pub shutdown_grace: Duration,
}

impl AgentSettings {
    /// Derives settings from the resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            topics: config.topics(),
            client_id: config.client_id(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// A running agent bound to a broker session.
///
/// Dropping the agent stops it.
pub struct Agent<S: Session> {
    session: Mutex<S>,
    status: Arc<StatusPublisher>,
    reporter: Arc<dyn HealthReporter>,
    shutdown_grace: Duration,
    running: AtomicBool,
}

impl<S: Session> Agent<S> {
    /// Wires the dispatcher and status publisher to `session` and starts it.
    ///
    /// Returns as soon as the session's network thread is running. The online
    /// status is announced each time the broker accepts the connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the session cannot be started.
    pub fn start(
        registry: OperationRegistry,
        mut session: S,
        settings: AgentSettings,
        reporter: Arc<dyn HealthReporter>,
    ) -> Result<Self, TransportError> {
        let registry = Arc::new(registry);
        let publisher = session.publisher();
        let AgentSettings {
            topics,
            client_id,
            shutdown_grace,
        } = settings;

        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&publisher), &topics);
        let channel = StatusChannel::new(topics.status.clone(), client_id, registry);
        let status = Arc::new(StatusPublisher::new(channel, publisher));
        let handler = Arc::new(AgentHandler {
            dispatcher,
            status: Arc::clone(&status),
            reporter: Arc::clone(&reporter),
        });

        session.start(handler)?;
        info!(
            target: LIFECYCLE_TARGET,
            request_topic = %topics.request,
            response_topic = %topics.response,
            "agent started"
        );

        Ok(Self {
            session: Mutex::new(session),
            status,
            reporter,
            shutdown_grace,
            running: AtomicBool::new(true),
        })
    }

    /// Returns `true` until [`Agent::stop`] has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Announces offline status and closes the session.
    ///
    /// Waits at most the configured grace interval for the announcement to be
    /// acknowledged. Only the first call has any effect.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.reporter.shutdown_starting();

        match self.status.publish(AgentStatus::Offline) {
            Ok(()) => self.reporter.status_published(AgentStatus::Offline),
            Err(error) => warn!(
                target: LIFECYCLE_TARGET,
                %error,
                "failed to announce offline status"
            ),
        }

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if !session.flush(self.shutdown_grace) {
            warn!(
                target: LIFECYCLE_TARGET,
                grace_ms = self.shutdown_grace.as_millis(),
                "offline status not acknowledged before grace interval elapsed"
            );
        }
        if let Err(error) = session.close() {
            warn!(
                target: LIFECYCLE_TARGET,
                %error,
                "session did not close cleanly"
            );
        }
        drop(session);
        self.reporter.shutdown_completed();
    }
}

impl<S: Session> Drop for Agent<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bridges session events to the dispatcher and status publisher.
struct AgentHandler {
    dispatcher: Dispatcher,
    status: Arc<StatusPublisher>,
    reporter: Arc<dyn HealthReporter>,
}

impl SessionHandler for AgentHandler {
    fn connected(&self) {
        self.reporter.session_connected();
        match self.status.publish(AgentStatus::Online) {
            Ok(()) => self.reporter.status_published(AgentStatus::Online),
            Err(error) => warn!(
                target: LIFECYCLE_TARGET,
                %error,
                "failed to announce online status"
            ),
        }
    }

    fn disconnected(&self, reason: &str) {
        self.reporter.session_disconnected(reason);
    }

    fn message(&self, topic: &str, payload: &[u8]) {
        self.dispatcher.dispatch(topic, payload);
    }
}
