//! End-to-end launch sequencing over a loopback session.

use std::io;
use std::sync::Arc;

use rstest::rstest;
use serde_json::Value;

use crate::bootstrap::{ConfigLoader, StaticConfigLoader};
use crate::envelope::AgentStatus;
use crate::process::launch::{LaunchPlan, run_agent_with};
use crate::process::{LaunchError, ShutdownError, ShutdownSignal};
use crate::registry::OperationProvider;

use super::support::{
    FailingConfigLoader, HealthEvent, ImmediateShutdown, LoopbackSessionFactory,
    RecordingHealthReporter, StubOperations, test_config,
};

struct BrokenShutdown;

impl ShutdownSignal for BrokenShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Err(ShutdownError::Install {
            source: io::Error::other("signal handlers unavailable"),
        })
    }
}

fn launch<L, S>(
    loader: L,
    shutdown: S,
    factory: &LoopbackSessionFactory,
    reporter: &Arc<RecordingHealthReporter>,
) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let stubs = StubOperations::default();
    let providers: Vec<&dyn OperationProvider> = vec![&stubs];
    run_agent_with(LaunchPlan {
        loader,
        reporter: reporter.clone(),
        providers,
        sessions: factory,
        shutdown,
    })
}

fn decode(payload: &[u8]) -> Value {
    serde_json::from_slice(payload).expect("status should be JSON")
}

#[rstest]
fn registers_a_retained_offline_last_will() {
    let factory = LoopbackSessionFactory::default();
    let reporter = Arc::new(RecordingHealthReporter::default());

    launch(
        StaticConfigLoader::new(test_config()),
        ImmediateShutdown,
        &factory,
        &reporter,
    )
    .expect("launch should succeed");

    let will = factory.last_will().expect("a last will should be registered");
    let topics = test_config().topics();
    assert_eq!(will.topic, topics.status);
    assert!(will.retain);
    let body = decode(&will.payload);
    assert_eq!(body["type"], "status");
    assert_eq!(body["payload"]["status"], "offline");
    assert_eq!(body["payload"]["clientId"], "castle_desktop_test");
}

#[rstest]
fn announces_offline_and_closes_on_shutdown() {
    let factory = LoopbackSessionFactory::default();
    let reporter = Arc::new(RecordingHealthReporter::default());

    launch(
        StaticConfigLoader::new(test_config()),
        ImmediateShutdown,
        &factory,
        &reporter,
    )
    .expect("launch should succeed");

    let broker = factory.broker().expect("a session should be opened");
    let statuses = broker
        .publisher()
        .envelopes_on(&test_config().topics().status);
    let last = statuses.last().expect("a status should be published");
    assert_eq!(last["payload"]["status"], "offline");
    assert_eq!(broker.closes(), 1);

    let events = reporter.events();
    assert!(events.contains(&HealthEvent::BootstrapSucceeded));
    assert_eq!(events.last(), Some(&HealthEvent::ShutdownCompleted));
}

#[rstest]
fn bootstrap_failures_open_no_session() {
    let factory = LoopbackSessionFactory::default();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = launch(FailingConfigLoader, ImmediateShutdown, &factory, &reporter)
        .expect_err("launch should fail");

    assert!(matches!(error, LaunchError::Bootstrap { .. }));
    assert!(factory.broker().is_none());
}

#[rstest]
fn shutdown_listener_failures_still_stop_the_agent() {
    let factory = LoopbackSessionFactory::default();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = launch(
        StaticConfigLoader::new(test_config()),
        BrokenShutdown,
        &factory,
        &reporter,
    )
    .expect_err("launch should report the listener failure");

    assert!(matches!(error, LaunchError::Shutdown { .. }));
    let broker = factory.broker().expect("a session should be opened");
    assert_eq!(broker.closes(), 1);
    assert!(
        reporter
            .events()
            .contains(&HealthEvent::StatusPublished(AgentStatus::Offline))
    );
}
