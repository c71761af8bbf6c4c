//! Test doubles shared by the agent's unit and behavioural suites.

mod config_loader;
mod operations;
mod publisher;
mod reporter;
mod session;

pub use config_loader::{FailingConfigLoader, test_config};
pub use operations::{StubOperations, stub_registry};
pub use publisher::RecordingPublisher;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use session::{ImmediateShutdown, LoopbackBroker, LoopbackSession, LoopbackSessionFactory};
