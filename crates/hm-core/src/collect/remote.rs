//! Remote process collection over an OpenSSH control-master session.
//!
//! The collector:
//! 1. opens an authenticated master connection (`ssh -M -N -f -S <socket>`),
//! 2. streams the agent executable to a fixed remote path,
//! 3. runs `[interpreter] <path> snapshot` and captures stdout,
//! 4. decodes the captured frame.
//!
//! Credentials are handled by OpenSSH: an explicit identity file when given,
//! otherwise ssh-agent keys and then the default `~/.ssh/id_*` keys.
//! `BatchMode=yes` keeps authentication failures terminal instead of
//! prompting.
//!
//! Cleanup is scoped: [`RemoteFile`] removes the uploaded agent and
//! [`SshSession`] closes the master connection when dropped, on every exit
//! path.

use super::host::HostTarget;
use super::runner::{run_command, CommandOutput, CommandSpec, RunnerError};
use super::CollectError;
use crate::snapshot::{self, ProcessSnapshot};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, span, warn, Level};

/// Exit status OpenSSH uses for its own (non-remote) failures.
const SSH_ERROR_EXIT: i32 = 255;

/// Timeout for the best-effort cleanup commands run from `Drop`.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    /// ssh client program.
    pub ssh_program: String,
    /// Remote login (if different from the current user).
    pub user: Option<String>,
    /// ssh port (default: 22).
    pub port: Option<u16>,
    /// Identity file used when the target does not name one.
    pub identity: Option<PathBuf>,
    /// Extra ssh options passed via -o.
    pub ssh_options: Vec<String>,
    /// Connection timeout in seconds (ssh ConnectTimeout).
    pub connect_timeout_secs: u64,
    /// Deadline for each ssh step in seconds.
    pub command_timeout_secs: u64,
    /// Local agent executable to upload (default: this executable).
    pub agent_source: Option<PathBuf>,
    /// Well-known remote path the agent is written to.
    pub remote_agent_path: String,
    /// Optional launcher prefix, e.g. `sudo -n` or a loader path.
    pub interpreter: Option<String>,
    /// Cap on captured agent output.
    pub max_output_bytes: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            user: None,
            port: None,
            identity: None,
            ssh_options: vec![
                "StrictHostKeyChecking=accept-new".to_string(),
                "BatchMode=yes".to_string(),
            ],
            connect_timeout_secs: 10,
            command_timeout_secs: 120,
            agent_source: None,
            remote_agent_path: "/tmp/hpcmail-agent".to_string(),
            interpreter: None,
            max_output_bytes: super::runner::DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl RemoteConfig {
    /// The target's identity, else the configured one.
    fn identity_for<'a>(&'a self, target: &'a HostTarget) -> Option<&'a Path> {
        target.identity.as_deref().or(self.identity.as_deref())
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Remote command line that runs the uploaded agent.
    fn agent_command(&self) -> String {
        let agent = shell_quote(&self.remote_agent_path);
        match self.interpreter.as_deref().map(str::trim) {
            Some(interp) if !interp.is_empty() => format!("{} {} snapshot", interp, agent),
            _ => format!("{} snapshot", agent),
        }
    }
}

/// Collect a snapshot from a remote host.
pub fn collect_remote(
    target: &HostTarget,
    config: &RemoteConfig,
) -> Result<ProcessSnapshot, CollectError> {
    let _span = span!(Level::INFO, "collect_remote", host = %target.address).entered();
    let start = Instant::now();

    if config.identity_for(target).is_none() {
        warn!(
            host = %target.address,
            "no ssh identity supplied; falling back to ssh-agent keys, then default ~/.ssh keys"
        );
    }

    let agent_source = match &config.agent_source {
        Some(path) => path.clone(),
        None => std::env::current_exe().map_err(|e| CollectError::Transfer {
            host: target.address.clone(),
            message: format!("cannot locate agent executable: {}", e),
        })?,
    };

    let session = SshSession::open(target, config)?;
    let agent = session.upload(&agent_source, &config.remote_agent_path)?;
    let output = session.execute_agent(&agent)?;

    let snapshot = snapshot::decode(&output).map_err(|source| CollectError::MalformedSnapshot {
        host: target.address.clone(),
        source,
    })?;

    info!(
        host = %target.address,
        remote_host = %snapshot.host,
        process_count = snapshot.len(),
        duration_ms = start.elapsed().as_millis() as u64,
        "remote snapshot collected"
    );
    Ok(snapshot)
}

/// An open ssh master connection. Closed on drop.
#[derive(Debug)]
pub struct SshSession<'c> {
    host: String,
    destination: String,
    config: &'c RemoteConfig,
    control_path: PathBuf,
    // Removed after the master has exited (field drops run after Drop::drop).
    _control_dir: TempDir,
}

impl<'c> SshSession<'c> {
    /// Authenticate and start the master connection.
    pub fn open(target: &HostTarget, config: &'c RemoteConfig) -> Result<Self, CollectError> {
        let host = target.address.clone();
        let connection_error = |message: String| CollectError::Connection {
            host: host.clone(),
            message,
        };

        let control_dir = tempfile::Builder::new()
            .prefix("hpcmail-ssh-")
            .tempdir()
            .map_err(|e| connection_error(format!("cannot create control socket dir: {}", e)))?;
        let control_path = control_dir.path().join("cm");

        let mut args = connection_args(config, config.identity_for(target), &control_path);
        args.extend(["-M", "-N", "-f"].map(String::from));
        args.push(destination(config, &host));

        debug!(host = %host, "opening ssh master connection");
        let spec = CommandSpec::new(&config.ssh_program, args).with_timeout(config.command_timeout());
        let output = run_command(&spec).map_err(|e| connection_error(e.to_string()))?;

        if output.timed_out {
            return Err(connection_error(format!(
                "timed out after {}s",
                config.command_timeout_secs
            )));
        }
        if !output.success() {
            return Err(connection_error(describe_failure(&output)));
        }

        Ok(Self {
            destination: destination(config, &host),
            host,
            config,
            control_path,
            _control_dir: control_dir,
        })
    }

    /// Run a command on the remote host through the master connection.
    fn run(&self, remote_command: &str, stdin: Option<&Path>) -> Result<CommandOutput, RunnerError> {
        self.run_with_timeout(remote_command, stdin, self.config.command_timeout())
    }

    fn run_with_timeout(
        &self,
        remote_command: &str,
        stdin: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, RunnerError> {
        let mut args = vec!["-S".to_string(), self.control_path.display().to_string()];
        if let Some(port) = self.config.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(self.destination.clone());
        args.push(remote_command.to_string());

        let mut spec = CommandSpec::new(&self.config.ssh_program, args)
            .with_timeout(timeout)
            .with_max_output(self.config.max_output_bytes);
        if let Some(path) = stdin {
            spec = spec.with_stdin(path);
        }
        run_command(&spec)
    }

    /// Stream a local file to `remote_path` and mark it executable.
    ///
    /// The returned guard removes the remote file when dropped. It is armed
    /// before the transfer so a partial upload is cleaned up as well.
    pub fn upload(&self, local: &Path, remote_path: &str) -> Result<RemoteFile<'_, 'c>, CollectError> {
        let guard = RemoteFile {
            session: self,
            path: remote_path.to_string(),
        };

        let command = upload_command(remote_path);

        debug!(host = %self.host, local = %local.display(), remote = remote_path, "uploading agent");
        let output = self.run(&command, Some(local)).map_err(|e| match e {
            RunnerError::StdinUnavailable { .. } => CollectError::Transfer {
                host: self.host.clone(),
                message: e.to_string(),
            },
            other => CollectError::Connection {
                host: self.host.clone(),
                message: other.to_string(),
            },
        })?;

        if output.timed_out {
            return Err(CollectError::Transfer {
                host: self.host.clone(),
                message: format!("timed out after {}s", self.config.command_timeout_secs),
            });
        }
        if output.exit_code == Some(SSH_ERROR_EXIT) {
            return Err(CollectError::Connection {
                host: self.host.clone(),
                message: describe_failure(&output),
            });
        }
        if !output.success() {
            return Err(CollectError::Transfer {
                host: self.host.clone(),
                message: describe_failure(&output),
            });
        }

        Ok(guard)
    }

    /// Run the uploaded agent and return its raw stdout.
    pub fn execute_agent(&self, agent: &RemoteFile<'_, '_>) -> Result<Vec<u8>, CollectError> {
        let command = self.config.agent_command();
        debug!(host = %self.host, agent = %agent.path, command = %command, "running agent");

        let execution_error = |message: String| CollectError::Execution {
            host: self.host.clone(),
            message,
        };

        let output = self.run(&command, None).map_err(|e| CollectError::Connection {
            host: self.host.clone(),
            message: e.to_string(),
        })?;

        if output.timed_out {
            return Err(execution_error(format!(
                "timed out after {}s",
                self.config.command_timeout_secs
            )));
        }
        if output.exit_code == Some(SSH_ERROR_EXIT) {
            return Err(CollectError::Connection {
                host: self.host.clone(),
                message: describe_failure(&output),
            });
        }
        if !output.success() {
            return Err(execution_error(describe_failure(&output)));
        }
        if output.truncated {
            return Err(execution_error(format!(
                "agent output exceeded {} bytes",
                self.config.max_output_bytes
            )));
        }
        if output.stdout.is_empty() {
            return Err(execution_error("agent produced no output".to_string()));
        }

        Ok(output.stdout)
    }
}

impl Drop for SshSession<'_> {
    fn drop(&mut self) {
        let args = vec![
            "-S".to_string(),
            self.control_path.display().to_string(),
            "-O".to_string(),
            "exit".to_string(),
            self.destination.clone(),
        ];
        let spec = CommandSpec::new(&self.config.ssh_program, args).with_timeout(CLEANUP_TIMEOUT);
        match run_command(&spec) {
            Ok(output) if output.success() => debug!(host = %self.host, "ssh master closed"),
            Ok(output) => warn!(
                host = %self.host,
                error = %describe_failure(&output),
                "failed to close ssh master connection"
            ),
            Err(e) => warn!(host = %self.host, error = %e, "failed to close ssh master connection"),
        }
    }
}

/// A file on the remote host, removed when dropped.
#[derive(Debug)]
pub struct RemoteFile<'s, 'c> {
    session: &'s SshSession<'c>,
    path: String,
}

impl Drop for RemoteFile<'_, '_> {
    fn drop(&mut self) {
        let command = format!("rm -f {}", shell_quote(&self.path));
        match self.session.run_with_timeout(&command, None, CLEANUP_TIMEOUT) {
            Ok(output) if output.success() => {
                debug!(host = %self.session.host, path = %self.path, "remote agent removed")
            }
            Ok(output) => warn!(
                host = %self.session.host,
                path = %self.path,
                error = %describe_failure(&output),
                "failed to remove remote agent"
            ),
            Err(e) => warn!(
                host = %self.session.host,
                path = %self.path,
                error = %e,
                "failed to remove remote agent"
            ),
        }
    }
}

/// Options shared by the master connection: auth, timeouts, control socket.
fn connection_args(config: &RemoteConfig, identity: Option<&Path>, control_path: &Path) -> Vec<String> {
    let mut args = vec!["-S".to_string(), control_path.display().to_string()];

    args.push("-o".to_string());
    args.push(format!("ConnectTimeout={}", config.connect_timeout_secs));

    for opt in &config.ssh_options {
        args.push("-o".to_string());
        args.push(opt.clone());
    }

    if let Some(identity) = identity {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
    }

    if let Some(port) = config.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }

    args
}

fn destination(config: &RemoteConfig, host: &str) -> String {
    match &config.user {
        Some(user) => format!("{}@{}", user, host),
        None => host.to_string(),
    }
}

fn describe_failure(output: &CommandOutput) -> String {
    let stderr = output.stderr_str();
    let code = output
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    if stderr.is_empty() {
        format!("exit code {}", code)
    } else {
        format!("exit code {}: {}", code, stderr)
    }
}

/// Remote shell command that writes stdin to `path` as a fresh 0700 file.
///
/// Whatever already sits at `path` is unlinked first, and noclobber makes the
/// redirect an exclusive create, so a file or symlink planted in a shared
/// directory is never written through.
fn upload_command(path: &str) -> String {
    format!(
        "rm -f {q} && umask 077 && (set -C; cat > {q}) && chmod 700 {q}",
        q = shell_quote(path)
    )
}

/// Quote a word for a POSIX shell.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':' | '='));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
