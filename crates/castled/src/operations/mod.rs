//! Built-in operations exposed by the agent.
//!
//! Each submodule registers one capability group. Capabilities the host
//! cannot provide are still registered, as handlers that fail with
//! [`OperationError::Unavailable`], so that controllers see a stable
//! operation list and a clear failure rather than `Unknown operation`.

mod app;
mod clipboard;
mod media;
mod process;
#[cfg(target_os = "linux")]
mod procfs;
mod shell;
mod system;
mod window;

use castle_config::Config;

use crate::operation::{Operation, OperationError, ParamMap, ResultMap};
use crate::registry::{OperationProvider, OperationRegistry};

pub use self::shell::{MAX_SHELL_TIMEOUT, ShellLimits};

pub(crate) const OPERATIONS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::operations");

/// Provider registering every built-in operation.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinOperations;

impl BuiltinOperations {
    /// Builds the provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OperationProvider for BuiltinOperations {
    fn provide(&self, config: &Config, registry: &mut OperationRegistry) {
        system::register(registry);
        process::register(registry);
        window::register(registry);
        clipboard::register(registry);
        shell::register(registry, ShellLimits::from_config(config));
        app::register(registry);
        media::register(registry);
    }
}

/// Handler that always reports `capability` as unavailable.
fn unavailable(capability: &'static str) -> impl Operation {
    move |_: ParamMap| -> Result<ResultMap, OperationError> {
        Err(OperationError::unavailable(capability))
    }
}
