//! Readers for the Linux `/proc` filesystem.

use std::fs;
use std::io;
use std::path::Path;

use nix::unistd::{SysconfVar, sysconf};

const PROC_ROOT: &str = "/proc";
const FALLBACK_CLOCK_TICKS: u64 = 100;
const FALLBACK_PAGE_SIZE: u64 = 4096;

/// Snapshot of one process.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct ProcessSample {
    pub pid: i32,
    pub name: String,
    /// Average CPU use over the process lifetime, in percent of one core.
    pub cpu_percent: f64,
    pub rss_bytes: u64,
}

/// Fields parsed from `/proc/<pid>/stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StatLine {
    pub name: String,
    pub cpu_ticks: u64,
    pub start_ticks: u64,
    pub rss_pages: u64,
}

/// Parses a `/proc/<pid>/stat` line.
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are located relative to the last `)`.
pub(super) fn parse_stat(line: &str) -> Option<StatLine> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    let name = line.get(open + 1..close)?.to_owned();
    let fields: Vec<&str> = line.get(close + 1..)?.split_whitespace().collect();
    // Index 0 is the state field (third field overall).
    let field = |index: usize| fields.get(index).and_then(|value| value.parse::<u64>().ok());
    Some(StatLine {
        name,
        cpu_ticks: field(11)? + field(12)?,
        start_ticks: field(19)?,
        rss_pages: field(21)?,
    })
}

/// Reads every process visible in `/proc`.
///
/// Processes that exit while being read are skipped.
pub(super) fn processes() -> io::Result<Vec<ProcessSample>> {
    let clock_ticks = clock_ticks();
    let page_size = page_size();
    let uptime = uptime_secs().unwrap_or_default();

    let mut samples = Vec::new();
    for entry in fs::read_dir(PROC_ROOT)? {
        let Ok(entry) = entry else { continue };
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<i32>().ok())
        else {
            continue;
        };
        let Ok(line) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        let Some(stat) = parse_stat(&line) else {
            continue;
        };
        samples.push(sample(pid, stat, clock_ticks, page_size, uptime));
    }
    Ok(samples)
}

/// Reads the command name of a single process.
pub(super) fn process_name(pid: i32) -> Option<String> {
    let path = Path::new(PROC_ROOT).join(pid.to_string()).join("stat");
    let line = fs::read_to_string(path).ok()?;
    parse_stat(&line).map(|stat| stat.name)
}

fn sample(pid: i32, stat: StatLine, clock_ticks: u64, page_size: u64, uptime: f64) -> ProcessSample {
    let ticks = clock_ticks as f64;
    let cpu_secs = stat.cpu_ticks as f64 / ticks;
    let alive_secs = uptime - stat.start_ticks as f64 / ticks;
    let cpu_percent = if alive_secs > 0.0 {
        (cpu_secs / alive_secs * 100.0 * 10.0).round() / 10.0
    } else {
        0.0
    };
    ProcessSample {
        pid,
        name: stat.name,
        cpu_percent,
        rss_bytes: stat.rss_pages.saturating_mul(page_size),
    }
}

/// Memory figures from `/proc/meminfo`, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct MemInfo {
    pub total: u64,
    pub available: u64,
}

/// Parses the contents of `/proc/meminfo`.
pub(super) fn parse_meminfo(contents: &str) -> Option<MemInfo> {
    let mut total = None;
    let mut available = None;
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let value = parts.next().and_then(|value| value.parse::<u64>().ok());
        match key {
            Some("MemTotal:") => total = value,
            Some("MemAvailable:") => available = value,
            _ => {}
        }
    }
    Some(MemInfo {
        total: total?.saturating_mul(1024),
        available: available?.saturating_mul(1024),
    })
}

/// Reads `/proc/meminfo`.
pub(super) fn meminfo() -> Option<MemInfo> {
    let contents = fs::read_to_string(Path::new(PROC_ROOT).join("meminfo")).ok()?;
    parse_meminfo(&contents)
}

fn uptime_secs() -> Option<f64> {
    let contents = fs::read_to_string(Path::new(PROC_ROOT).join("uptime")).ok()?;
    contents.split_whitespace().next()?.parse().ok()
}

fn clock_ticks() -> u64 {
    sysconf_u64(SysconfVar::CLK_TCK).unwrap_or(FALLBACK_CLOCK_TICKS)
}

fn page_size() -> u64 {
    sysconf_u64(SysconfVar::PAGE_SIZE).unwrap_or(FALLBACK_PAGE_SIZE)
}

fn sysconf_u64(var: SysconfVar) -> Option<u64> {
    let value = sysconf(var).ok().flatten()?;
    u64::try_from(value).ok().filter(|value| *value > 0)
}
