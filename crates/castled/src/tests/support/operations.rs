//! Stub operations with observable side effects.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

use castle_config::Config;

use crate::operation::{OperationError, ParamMap, ResultMap, into_result};
use crate::registry::{OperationProvider, OperationRegistry};

/// Provider registering a small, deterministic operation set:
///
/// * `echo` returns its params.
/// * `fail` fails with `boom`.
/// * `explode` panics.
/// * `slow` sleeps for `params.ms` milliseconds, then records `params.tag`.
/// * `count` returns how many times it has been invoked.
#[derive(Clone, Default)]
pub struct StubOperations {
    completions: Arc<Mutex<Vec<String>>>,
}

impl StubOperations {
    /// Tags recorded by `slow`, in completion order.
    #[must_use]
    pub fn completions(&self) -> Vec<String> {
        self.completions
            .lock()
            .expect("completions mutex poisoned")
            .clone()
    }
}

impl OperationProvider for StubOperations {
    fn provide(&self, _config: &Config, registry: &mut OperationRegistry) {
        registry.register("echo", |params: ParamMap| -> Result<ResultMap, OperationError> {
            Ok(params)
        });
        registry.register("fail", |_: ParamMap| -> Result<ResultMap, OperationError> {
            Err(OperationError::failed("boom"))
        });
        registry.register("explode", |_: ParamMap| -> Result<ResultMap, OperationError> {
            panic!("operation exploded")
        });

        let completions = Arc::clone(&self.completions);
        registry.register(
            "slow",
            move |params: ParamMap| -> Result<ResultMap, OperationError> {
                let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
                thread::sleep(Duration::from_millis(ms));
                let tag = params
                    .get("tag")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                completions
                    .lock()
                    .expect("completions mutex poisoned")
                    .push(tag.clone());
                Ok(into_result(json!({ "tag": tag })))
            },
        );

        let invocations = Arc::new(Mutex::new(0_u64));
        registry.register(
            "count",
            move |_: ParamMap| -> Result<ResultMap, OperationError> {
                let mut count = invocations.lock().expect("count mutex poisoned");
                *count += 1;
                Ok(into_result(json!({ "count": *count })))
            },
        );
    }
}

/// Registry populated from a fresh [`StubOperations`].
#[must_use]
pub fn stub_registry() -> (OperationRegistry, StubOperations) {
    let stubs = StubOperations::default();
    let mut registry = OperationRegistry::new();
    stubs.provide(&Config::default(), &mut registry);
    (registry, stubs)
}
