//! Shell command execution with a hard time ceiling.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, warn};

use castle_config::Config;

use super::OPERATIONS_TARGET;
use crate::operation::{OperationError, ParamLookup, ParamMap, ResultMap, into_result};
use crate::registry::OperationRegistry;

/// Longest a single command may run, whatever the request asks for.
pub const MAX_SHELL_TIMEOUT: Duration = Duration::from_secs(120);

const MIN_SHELL_TIMEOUT: Duration = Duration::from_secs(1);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Bounds applied to `run_command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellLimits {
    /// Timeout used when the request names none.
    pub default_timeout: Duration,
    /// Bytes kept from each of stdout and stderr.
    pub max_output_bytes: usize,
}

impl ShellLimits {
    /// Reads the limits from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_timeout: config.shell_timeout(),
            max_output_bytes: config.shell_max_output_bytes(),
        }
    }

    /// Resolves the effective timeout for a request.
    ///
    /// Requested values may be fractional and are clamped to between one
    /// second and [`MAX_SHELL_TIMEOUT`]. Non-finite values fall back to the
    /// default.
    #[must_use]
    pub fn timeout_for(&self, requested_secs: Option<f64>) -> Duration {
        match requested_secs {
            Some(secs) if secs.is_finite() => Duration::from_secs_f64(secs.clamp(
                MIN_SHELL_TIMEOUT.as_secs_f64(),
                MAX_SHELL_TIMEOUT.as_secs_f64(),
            )),
            _ => self
                .default_timeout
                .clamp(MIN_SHELL_TIMEOUT, MAX_SHELL_TIMEOUT),
        }
    }
}

/// One budget shared by the wait for exit and the drain of both pipes.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    timeout: Duration,
    expires_at: Instant,
}

impl Deadline {
    fn start(timeout: Duration) -> Self {
        Self {
            timeout,
            expires_at: Instant::now() + timeout,
        }
    }

    fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    fn has_passed(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn exceeded(&self) -> OperationError {
        OperationError::timed_out("command", self.timeout.as_secs())
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Chunk = (Stream, io::Result<Vec<u8>>);

#[derive(Debug, Default)]
struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Output {
    fn store(&mut self, stream: Stream, read: io::Result<Vec<u8>>) {
        let bytes = read.unwrap_or_else(|error| {
            warn!(target: OPERATIONS_TARGET, ?stream, %error, "failed to read command output");
            Vec::new()
        });
        match stream {
            Stream::Stdout => self.stdout = bytes,
            Stream::Stderr => self.stderr = bytes,
        }
    }
}

pub(super) fn register(registry: &mut OperationRegistry, limits: ShellLimits) {
    registry.register("run_command", move |params: ParamMap| {
        run_command(&limits, &params)
    });
}

fn run_command(limits: &ShellLimits, params: &ParamMap) -> Result<ResultMap, OperationError> {
    let command = params.required_str("command")?;
    let deadline = Deadline::start(limits.timeout_for(params.optional_f64("timeout")?));

    let mut child = shell(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| OperationError::io("failed to start command", source))?;

    let cap = limits.max_output_bytes;
    let (sender, chunks) = mpsc::channel();
    if let Some(pipe) = child.stdout.take() {
        capture(Stream::Stdout, pipe, cap, sender.clone());
    }
    if let Some(pipe) = child.stderr.take() {
        capture(Stream::Stderr, pipe, cap, sender.clone());
    }
    drop(sender);

    let status = wait_for_exit(&mut child, deadline)?;
    // Descendants left in the background keep the pipes open past the exit.
    let Some(output) = drain(&chunks, deadline) else {
        warn!(
            target: OPERATIONS_TARGET,
            timeout_secs = deadline.timeout.as_secs_f64(),
            "command output still open at deadline, killing process group"
        );
        kill_process_tree(&mut child);
        return Err(deadline.exceeded());
    };

    debug!(
        target: OPERATIONS_TARGET,
        ?status,
        stdout_bytes = output.stdout.len(),
        stderr_bytes = output.stderr.len(),
        "command finished"
    );
    Ok(into_result(json!({
        "stdout": decode_truncated(output.stdout),
        "stderr": decode_truncated(output.stderr),
        "return_code": status.code(),
    })))
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command).process_group(0);
    shell
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}

/// Kills the shell together with everything it started.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let group = i32::try_from(child.id()).map(Pid::from_raw);
    match group.map(|group| killpg(group, Signal::SIGKILL)) {
        Ok(Ok(()) | Err(Errno::ESRCH)) => {}
        Ok(Err(errno)) => {
            warn!(target: OPERATIONS_TARGET, %errno, "failed to kill process group");
            drop(child.kill());
        }
        Err(_) => drop(child.kill()),
    }
    drop(child.wait());
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}

/// Polls the child until it exits, killing it once the deadline passes.
fn wait_for_exit(child: &mut Child, deadline: Deadline) -> Result<ExitStatus, OperationError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if deadline.has_passed() {
                    warn!(
                        target: OPERATIONS_TARGET,
                        timeout_secs = deadline.timeout.as_secs_f64(),
                        "command timed out, killing process group"
                    );
                    kill_process_tree(child);
                    return Err(deadline.exceeded());
                }
                thread::sleep(POLL_INTERVAL.min(deadline.remaining()));
            }
            Err(source) => {
                kill_process_tree(child);
                return Err(OperationError::io("failed to wait for command", source));
            }
        }
    }
}

/// Gathers both streams, giving up once the deadline passes.
///
/// Returns `None` when a pipe is still open at the deadline.
fn drain(chunks: &Receiver<Chunk>, deadline: Deadline) -> Option<Output> {
    let mut output = Output::default();
    loop {
        match chunks.recv_timeout(deadline.remaining()) {
            Ok((stream, read)) => output.store(stream, read),
            Err(RecvTimeoutError::Disconnected) => return Some(output),
            Err(RecvTimeoutError::Timeout) => return None,
        }
    }
}

/// Drains `pipe` on a background thread, keeping at most `cap` bytes.
///
/// A reader still blocked at the deadline is abandoned; it finishes once the
/// killed process group releases the pipe.
fn capture<R>(stream: Stream, pipe: R, cap: usize, chunks: Sender<Chunk>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        // The receiver is gone once the command has timed out.
        drop(chunks.send((stream, read_capped(pipe, cap))));
    });
}

/// Reads `reader` to the end, retaining only the first `cap` bytes.
///
/// The remainder is discarded so that the writer never blocks on a full pipe.
fn read_capped(mut reader: impl Read, cap: usize) -> io::Result<Vec<u8>> {
    let mut kept = Vec::new();
    let mut chunk = [0_u8; 8192];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        let room = cap.saturating_sub(kept.len());
        kept.extend_from_slice(chunk.get(..read.min(room)).unwrap_or_default());
    }
    Ok(kept)
}

/// Decodes output that may have been cut mid-character.
///
/// An incomplete trailing sequence is dropped; other invalid bytes are
/// replaced.
fn decode_truncated(mut bytes: Vec<u8>) -> String {
    if let Err(error) = std::str::from_utf8(&bytes) {
        if error.error_len().is_none() {
            bytes.truncate(error.valid_up_to());
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
