//! External command runner with timeout and output cap.
//!
//! Every ssh invocation made by the remote collector goes through here:
//!
//! - Per-command deadline with SIGTERM → SIGKILL escalation
//! - Output size cap to prevent memory exhaustion
//! - Optional stdin redirection from a file (agent upload)
//! - Program path validation to prevent injection
//!
//! Output is read with non-blocking reads so a background grandchild that
//! keeps the pipes open (e.g. an `ssh -f` control master) cannot hang the
//! caller after the direct child has exited.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// Default timeout per command in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default maximum captured output per stream in bytes (64MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

const CHUNK_SIZE: usize = 8192;

/// Errors that prevent a command from running at all.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("cannot open stdin file {path}: {source}")]
    StdinUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid command path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A command to run, with its limits.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,

    /// Arguments to pass.
    pub args: Vec<String>,

    /// File to connect to stdin (None = /dev/null).
    pub stdin: Option<PathBuf>,

    /// Deadline for the whole command.
    pub timeout: Duration,

    /// Cap per captured stream.
    pub max_output: usize,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            stdin: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    pub fn with_stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }
}

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output (may be truncated).
    pub stdout: Vec<u8>,

    /// Standard error (may be truncated).
    pub stderr: Vec<u8>,

    /// Exit code (None when killed by a signal).
    pub exit_code: Option<i32>,

    /// Whether either stream hit the output cap.
    pub truncated: bool,

    /// Whether the deadline expired and the command was killed.
    pub timed_out: bool,

    /// Execution duration.
    pub duration: Duration,
}

impl CommandOutput {
    /// Stderr as trimmed text (lossy UTF-8 conversion).
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Check if the command succeeded (exit code 0, no timeout).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Run a command to completion or until its deadline.
pub fn run_command(spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
    validate_program(&spec.program)?;

    debug!(
        program = %spec.program,
        args = ?spec.args,
        timeout_ms = spec.timeout.as_millis() as u64,
        "running command"
    );

    let stdin = match &spec.stdin {
        Some(path) => Stdio::from(File::open(path).map_err(|source| {
            RunnerError::StdinUnavailable {
                path: path.clone(),
                source,
            }
        })?),
        None => Stdio::null(),
    };

    let start = Instant::now();
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::CommandNotFound(spec.program.clone())
            } else {
                error!(program = %spec.program, error = %e, "failed to spawn");
                RunnerError::SpawnFailed(e.to_string())
            }
        })?;

    let result = execute_with_timeout(&mut child, spec.timeout, spec.max_output);
    let duration = start.elapsed();

    let (stdout, stderr, exit_code, truncated, timed_out) = result?;
    debug!(
        program = %spec.program,
        duration_ms = duration.as_millis() as u64,
        exit_code = ?exit_code,
        stdout_bytes = stdout.len(),
        timed_out,
        "command complete"
    );

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code,
        truncated,
        timed_out,
        duration,
    })
}

/// Validate that a program path is safe to execute.
fn validate_program(program: &str) -> Result<(), RunnerError> {
    if program.is_empty() {
        return Err(RunnerError::InvalidPath("empty program".to_string()));
    }

    if program.contains(['|', '&', ';', '$', '`', '\n', '\r']) {
        return Err(RunnerError::InvalidPath(format!(
            "program contains shell metacharacters: {}",
            program
        )));
    }

    if program.starts_with('/') && !Path::new(program).exists() {
        return Err(RunnerError::CommandNotFound(program.to_string()));
    }

    Ok(())
}

type Captured = (Vec<u8>, Vec<u8>, Option<i32>, bool, bool);

fn execute_with_timeout(
    child: &mut Child,
    timeout: Duration,
    max_output: usize,
) -> Result<Captured, RunnerError> {
    let deadline = Instant::now() + timeout;
    let mut stdout_buf = Vec::with_capacity(max_output.min(65536));
    let mut stderr_buf = Vec::with_capacity(max_output.min(65536));
    let mut truncated = false;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        if Instant::now() >= deadline {
            warn!("command timed out, sending SIGTERM");
            kill_with_grace(child);
            let status = child.wait().ok();
            return Ok((
                stdout_buf,
                stderr_buf,
                status.and_then(|s| s.code()),
                truncated,
                true,
            ));
        }

        let mut did_read = false;

        if let Some(ref mut out) = stdout {
            if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                if n > 0 {
                    did_read = true;
                    append_capped(&mut stdout_buf, &chunk[..n], max_output, &mut truncated);
                }
            }
        }

        if let Some(ref mut err) = stderr {
            if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                if n > 0 {
                    did_read = true;
                    append_capped(&mut stderr_buf, &chunk[..n], max_output, &mut truncated);
                }
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                if let Some(ref mut out) = stdout {
                    drain_to_limit(out, &mut stdout_buf, max_output, &mut truncated)?;
                }
                if let Some(ref mut err) = stderr {
                    drain_to_limit(err, &mut stderr_buf, max_output, &mut truncated)?;
                }
                let exit_code = status.code();
                trace!(exit_code = ?exit_code, "process exited");
                return Ok((stdout_buf, stderr_buf, exit_code, truncated, false));
            }
            Ok(None) => {
                if !did_read {
                    thread::sleep(Duration::from_millis(10));
                }
            }
            Err(e) => {
                error!(error = %e, "failed to wait for child");
                return Err(RunnerError::Io(e));
            }
        }
    }
}

fn append_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if data.len() > space {
        *truncated = true;
    }
    buf.extend_from_slice(&data[..data.len().min(space)]);
}

/// Drain what is immediately available from a stream, up to the limit.
fn drain_to_limit<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Kill a process with SIGTERM, then SIGKILL after the grace period.
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;

    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => trace!(pid, "process exited after SIGTERM"),
        Ok(None) => {
            warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
        Err(e) => error!(pid, error = %e, "failed to check process status"),
    }
}

/// Read from a stream without blocking.
///
/// Sets O_NONBLOCK for the duration of one read and restores the original
/// flags. Returns Ok(0) if no data is available (EAGAIN/EWOULDBLOCK).
fn try_read_nonblocking<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}
