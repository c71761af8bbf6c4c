//! Window management.
//!
//! No portable window-control backend is available to the agent, so every
//! window operation reports the capability as unavailable.

use super::unavailable;
use crate::registry::OperationRegistry;

const CAPABILITY: &str = "window management";

pub(super) fn register(registry: &mut OperationRegistry) {
    for name in [
        "list_windows",
        "focus_window",
        "minimize_window",
        "maximize_window",
        "close_window",
    ] {
        registry.register(name, unavailable(CAPABILITY));
    }
}
