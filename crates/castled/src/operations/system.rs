//! Host information and desktop notifications.

use std::env;
use std::num::NonZeroUsize;
use std::thread;

use notify_rust::Notification;
use serde_json::{Value, json};

use crate::operation::{OperationError, ParamLookup, ParamMap, ResultMap, into_result};
use crate::registry::OperationRegistry;

const DEFAULT_NOTIFICATION_TITLE: &str = "Castle";
const NOTIFICATION_APP_NAME: &str = "Castle Desktop Agent";
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub(super) fn register(registry: &mut OperationRegistry) {
    registry.register("system_info", system_info);
    registry.register("notification", notification);
}

fn system_info(_params: ParamMap) -> Result<ResultMap, OperationError> {
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let cpu_count = thread::available_parallelism().map_or(1, NonZeroUsize::get);

    let mut info = into_result(json!({
        "hostname": hostname,
        "os": env::consts::OS,
        "os_version": os_version(),
        "architecture": env::consts::ARCH,
        "cpu_count": cpu_count,
    }));
    info.extend(memory_figures());
    info.extend(disk_figures());
    Ok(info)
}

#[cfg(unix)]
fn os_version() -> Value {
    nix::sys::utsname::uname().map_or(Value::Null, |uts| {
        Value::String(uts.release().to_string_lossy().into_owned())
    })
}

#[cfg(not(unix))]
fn os_version() -> Value {
    Value::Null
}

#[cfg(target_os = "linux")]
fn memory_figures() -> ResultMap {
    let Some(mem) = super::procfs::meminfo() else {
        return ResultMap::new();
    };
    let used = mem.total.saturating_sub(mem.available);
    into_result(json!({
        "ram_total_mb": (mem.total as f64 / MIB).round(),
        "ram_used_mb": (used as f64 / MIB).round(),
        "ram_percent": percent(used, mem.total),
    }))
}

#[cfg(not(target_os = "linux"))]
fn memory_figures() -> ResultMap {
    ResultMap::new()
}

#[cfg(unix)]
fn disk_figures() -> ResultMap {
    let Ok(stat) = nix::sys::statvfs::statvfs("/") else {
        return ResultMap::new();
    };
    let fragment = u64::from(stat.fragment_size());
    let total = u64::from(stat.blocks()).saturating_mul(fragment);
    let free = u64::from(stat.blocks_free()).saturating_mul(fragment);
    let available = u64::from(stat.blocks_available()).saturating_mul(fragment);
    let used = total.saturating_sub(free);
    into_result(json!({
        "disk_total_gb": round_tenths(total as f64 / GIB),
        "disk_used_gb": round_tenths(used as f64 / GIB),
        // Matches `df`: reserved blocks count as neither used nor available.
        "disk_percent": percent(used, used.saturating_add(available)),
    }))
}

#[cfg(not(unix))]
fn disk_figures() -> ResultMap {
    ResultMap::new()
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_tenths(part as f64 / whole as f64 * 100.0)
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn notification(params: ParamMap) -> Result<ResultMap, OperationError> {
    let message = params.required_str("message")?;
    let title = params
        .optional_str("title")?
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_NOTIFICATION_TITLE);

    Notification::new()
        .summary(title)
        .body(message)
        .appname(NOTIFICATION_APP_NAME)
        .show()
        .map_err(|error| OperationError::failed(format!("failed to show notification: {error}")))?;

    Ok(into_result(json!({ "success": true })))
}
