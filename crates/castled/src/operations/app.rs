//! Application and URL launching.

use std::process::{Command, Stdio};
use std::thread;

use serde_json::json;
use tracing::{debug, info};

use super::OPERATIONS_TARGET;
use crate::operation::{OperationError, ParamLookup, ParamMap, ResultMap, into_result};
use crate::registry::OperationRegistry;

pub(super) fn register(registry: &mut OperationRegistry) {
    registry.register("open_app", open_app);
    registry.register("open_url", open_url);
}

fn open_app(params: ParamMap) -> Result<ResultMap, OperationError> {
    let path = params.required_str("path")?;
    let args = params.string_list("args")?;

    let mut child = Command::new(path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| OperationError::io(format!("failed to launch {path}"), source))?;
    let pid = child.id();
    info!(
        target: OPERATIONS_TARGET,
        path,
        pid,
        "launched application"
    );

    // Reap the child when it exits so it does not linger as a zombie.
    thread::spawn(move || {
        let status = child.wait();
        debug!(target: OPERATIONS_TARGET, pid, ?status, "application exited");
    });

    Ok(into_result(json!({ "success": true, "pid": pid })))
}

fn open_url(params: ParamMap) -> Result<ResultMap, OperationError> {
    let url = params.required_str("url")?;
    open::that_detached(url)
        .map_err(|source| OperationError::io(format!("failed to open {url}"), source))?;
    Ok(into_result(json!({ "success": true, "url": url })))
}
