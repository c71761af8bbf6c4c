//! The Castle desktop agent.
//!
//! The agent exposes local machine capabilities (process control, clipboard,
//! shell execution and friends) as named operations over an MQTT message bus.
//! A controller publishes a request envelope on the request topic; the agent
//! resolves the named operation in its [`OperationRegistry`], runs it, and
//! publishes a correlated response or error envelope on the response topic.
//! A retained status envelope announces whether the agent is online and which
//! operations it offers.
//!
//! ## Execution model
//!
//! Inbound messages are handled on the transport's single network thread.
//! Each request runs to completion before the next one is read, so replies
//! leave in the order requests arrived. A slow operation delays every request
//! queued behind it; operations that wait on external work enforce their own
//! hard ceilings (shell commands are capped at two minutes).
//!
//! ## Shutdown
//!
//! [`Agent::stop`] publishes a retained `offline` status, waits a bounded
//! grace interval for the broker to acknowledge it, then closes the session.
//! The call is idempotent, so signal-driven and regular shutdown can both
//! invoke it.

mod bootstrap;
mod dispatch;
mod envelope;
mod health;
mod lifecycle;
mod operation;
pub mod operations;
mod process;
mod registry;
mod status;
mod telemetry;
mod transport;

pub use bootstrap::{
    AgentContext, BootstrapError, ConfigLoader, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use dispatch::{DecodeError, DispatchError, DispatchOutcome, Dispatcher};
pub use envelope::{
    AgentStatus, Envelope, EnvelopeKind, ErrorEnvelope, ErrorPayload, ResponseEnvelope,
    ResponsePayload, StatusEnvelope, StatusPayload,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use lifecycle::{Agent, AgentSettings};
pub use operation::{Operation, OperationError, ParamLookup, ParamMap, ResultMap, into_result};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_agent};
pub use registry::{OperationProvider, OperationRegistry};
pub use status::{StatusChannel, StatusError, StatusPublisher};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    DeliveryTracker, MessagePublisher, MqttSession, MqttSessionFactory, MqttSettings,
    OutboundMessage, Session, SessionFactory, SessionHandler, TransportError,
};

#[cfg(test)]
mod tests;
