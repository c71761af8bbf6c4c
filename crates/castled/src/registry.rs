//! Name-to-handler mapping consulted by the dispatcher.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use castle_config::Config;
use tracing::debug;

use crate::operation::Operation;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::operations");

/// Contributes a group of operations to the registry during startup.
pub trait OperationProvider {
    /// Registers this provider's operations.
    fn provide(&self, config: &Config, registry: &mut OperationRegistry);
}

/// Registered operations keyed by name.
///
/// The registry is mutated only while the agent starts. Once serving begins it
/// is shared read-only between the dispatcher and the status publisher.
#[derive(Default, Clone)]
pub struct OperationRegistry {
    operations: BTreeMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to `operation`, replacing any earlier binding.
    pub fn register<O>(&mut self, name: impl Into<String>, operation: O)
    where
        O: Operation + 'static,
    {
        self.register_shared(name, Arc::new(operation));
    }

    /// Binds `name` to an already shared operation.
    pub fn register_shared(&mut self, name: impl Into<String>, operation: Arc<dyn Operation>) {
        let name = name.into();
        if self.operations.insert(name.clone(), operation).is_some() {
            debug!(
                target: REGISTRY_TARGET,
                operation = %name,
                "replaced existing operation"
            );
        }
    }

    /// Resolves an operation by exact name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names in ascending lexical order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.operations.keys().cloned().collect()
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish()
    }
}
