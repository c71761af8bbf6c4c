//! Configuration fixtures.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::OrthoError;

use castle_config::Config;

use crate::bootstrap::ConfigLoader;

/// Configuration with a fixed client id and a short shutdown grace.
#[must_use]
pub fn test_config() -> Config {
    Config {
        client_id: Some(String::from("castle_desktop_test")),
        shutdown_grace_ms: 50,
        log_filter: String::from("off"),
        ..Config::default()
    }
}

/// Loader that intentionally fails by passing an invalid CLI flag value.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("castled"),
            OsString::from("--broker-port"),
            OsString::from("not-a-port"),
        ];
        Config::load_from_iter(args)
    }
}
