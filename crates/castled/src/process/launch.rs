//! Supervises agent launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::info;

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::envelope::AgentStatus;
use crate::health::HealthReporter;
use crate::lifecycle::{Agent, AgentSettings};
use crate::operations::BuiltinOperations;
use crate::registry::{OperationProvider, OperationRegistry};
use crate::status::StatusChannel;
use crate::transport::{MqttSessionFactory, OutboundMessage, SessionFactory};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the agent.
pub(crate) struct LaunchPlan<'a, L, F, S> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) providers: Vec<&'a dyn OperationProvider>,
    pub(crate) sessions: F,
    pub(crate) shutdown: S,
}

/// Runs the agent using the production collaborators.
///
/// Blocks until an interrupt or termination signal arrives, then announces
/// offline status and disconnects.
pub fn run_agent() -> Result<(), LaunchError> {
    let builtins = BuiltinOperations::new();
    let providers: Vec<&dyn OperationProvider> = vec![&builtins];
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        reporter: Arc::new(StructuredHealthReporter::new()),
        providers,
        sessions: MqttSessionFactory,
        shutdown: SystemShutdownSignal::new(),
    };
    run_agent_with(plan)
}

/// Runs the agent with injected collaborators.
pub(crate) fn run_agent_with<L, F, S>(plan: LaunchPlan<'_, L, F, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    F: SessionFactory,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        reporter,
        providers,
        sessions,
        shutdown,
    } = plan;

    let context = bootstrap_with(&loader, reporter.as_ref(), &providers)?;
    let (config, registry) = context.into_parts();
    let settings = AgentSettings::from_config(&config);

    let last_will = offline_will(&settings, &registry)?;
    let session = sessions.open(&config, last_will)?;
    let agent = Agent::start(registry, session, settings, reporter)?;

    let waited = shutdown.wait();
    agent.stop();
    waited?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}

fn offline_will(
    settings: &AgentSettings,
    registry: &OperationRegistry,
) -> Result<OutboundMessage, LaunchError> {
    StatusChannel::new(
        settings.topics.status.clone(),
        settings.client_id.clone(),
        Arc::new(registry.clone()),
    )
    .message(AgentStatus::Offline)
    .map_err(|source| LaunchError::LastWill { source })
}
