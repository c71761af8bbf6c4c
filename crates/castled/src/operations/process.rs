//! Process listing and termination.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use super::OPERATIONS_TARGET;
use crate::operation::{OperationError, ParamLookup, ParamMap, ResultMap, into_result};
use crate::registry::OperationRegistry;

const DEFAULT_LIMIT: u64 = 50;

pub(super) fn register(registry: &mut OperationRegistry) {
    registry.register("list_processes", list_processes);
    registry.register("kill_process", kill_process);
}

/// Ordering requested by `list_processes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKey {
    Memory,
    Cpu,
    Name,
}

impl SortKey {
    /// Unknown keys fall back to memory ordering.
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("cpu") => Self::Cpu,
            Some("name") => Self::Name,
            _ => Self::Memory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ProcessEntry {
    pid: i32,
    name: String,
    cpu_percent: f64,
    memory_mb: f64,
}

/// Sorts descending by usage, or ascending by name.
fn sort_entries(entries: &mut [ProcessEntry], key: SortKey) {
    match key {
        SortKey::Memory => entries.sort_by(|a, b| b.memory_mb.total_cmp(&a.memory_mb)),
        SortKey::Cpu => entries.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent)),
        SortKey::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
    }
}

fn list_processes(params: ParamMap) -> Result<ResultMap, OperationError> {
    let key = SortKey::parse(params.optional_str("sort_by")?);
    let limit = params.optional_u64("limit")?.unwrap_or(DEFAULT_LIMIT);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);

    let mut entries = snapshot()?;
    let total = entries.len();
    sort_entries(&mut entries, key);
    entries.truncate(limit);

    let processes = serde_json::to_value(entries)
        .map_err(|error| OperationError::failed(format!("failed to encode processes: {error}")))?;
    Ok(into_result(json!({ "processes": processes, "total": total })))
}

#[cfg(target_os = "linux")]
fn snapshot() -> Result<Vec<ProcessEntry>, OperationError> {
    let samples = super::procfs::processes()
        .map_err(|source| OperationError::io("failed to read process table", source))?;
    Ok(samples
        .into_iter()
        .map(|sample| ProcessEntry {
            pid: sample.pid,
            name: sample.name,
            cpu_percent: sample.cpu_percent,
            memory_mb: (sample.rss_bytes as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0,
        })
        .collect())
}

#[cfg(not(target_os = "linux"))]
fn snapshot() -> Result<Vec<ProcessEntry>, OperationError> {
    Err(OperationError::unavailable("process listing"))
}

/// Selector accepted by `kill_process`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Pid(i32),
    Name(String),
}

impl Target {
    /// A zero pid or empty name counts as absent; pid wins when both appear.
    fn from_params(params: &ParamMap) -> Result<Self, OperationError> {
        let pid = params.optional_u64("pid")?.filter(|pid| *pid != 0);
        let name = params.optional_str("name")?.filter(|name| !name.is_empty());
        match (pid, name) {
            (Some(pid), _) => i32::try_from(pid)
                .map(Self::Pid)
                .map_err(|_| OperationError::invalid_params(format!("pid {pid} is out of range"))),
            (None, Some(name)) => Ok(Self::Name(name.to_owned())),
            (None, None) => Err(OperationError::invalid_params("pid or name is required")),
        }
    }

    fn not_found(&self) -> OperationError {
        let (pid, name) = match self {
            Self::Pid(pid) => (pid.to_string(), String::from("none")),
            Self::Name(name) => (String::from("none"), name.clone()),
        };
        OperationError::not_found(format!("No process found matching: pid={pid}, name={name}"))
    }
}

fn kill_process(params: ParamMap) -> Result<ResultMap, OperationError> {
    let target = Target::from_params(&params)?;
    let killed = terminate(&target)?;
    if killed.is_empty() {
        return Err(target.not_found());
    }
    info!(
        target: OPERATIONS_TARGET,
        count = killed.len(),
        "terminated processes"
    );
    Ok(into_result(json!({ "success": true, "killed": killed })))
}

#[cfg(unix)]
fn terminate(target: &Target) -> Result<Vec<Value>, OperationError> {
    match target {
        Target::Pid(pid) => {
            let name = process_name(*pid);
            match send_sigterm(*pid) {
                Ok(()) => Ok(vec![json!({ "pid": pid, "name": name })]),
                Err(nix::errno::Errno::ESRCH) => Ok(Vec::new()),
                Err(errno) => Err(OperationError::io(
                    format!("failed to terminate pid {pid}"),
                    errno.into(),
                )),
            }
        }
        Target::Name(name) => Ok(matching_pids(name)?
            .into_iter()
            // Processes that exit or deny access mid-scan are skipped.
            .filter(|(pid, _)| send_sigterm(*pid).is_ok())
            .map(|(pid, name)| json!({ "pid": pid, "name": name }))
            .collect()),
    }
}

#[cfg(not(unix))]
fn terminate(_target: &Target) -> Result<Vec<Value>, OperationError> {
    Err(OperationError::unavailable("process termination"))
}

#[cfg(unix)]
fn send_sigterm(pid: i32) -> Result<(), nix::errno::Errno> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid), Signal::SIGTERM)
}

#[cfg(target_os = "linux")]
fn process_name(pid: i32) -> Option<String> {
    super::procfs::process_name(pid)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_name(_pid: i32) -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn matching_pids(name: &str) -> Result<Vec<(i32, String)>, OperationError> {
    let wanted = name.to_lowercase();
    let samples = super::procfs::processes()
        .map_err(|source| OperationError::io("failed to read process table", source))?;
    Ok(samples
        .into_iter()
        .filter(|sample| sample.name.to_lowercase() == wanted)
        .map(|sample| (sample.pid, sample.name))
        .collect())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn matching_pids(_name: &str) -> Result<Vec<(i32, String)>, OperationError> {
    Err(OperationError::unavailable("process lookup by name"))
}
