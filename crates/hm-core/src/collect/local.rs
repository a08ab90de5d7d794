//! Local process collection via the /proc filesystem.
//!
//! Each numeric entry of /proc yields one record:
//! - owner from the real UID in `/proc/<pid>/status`
//! - command line tokens from NUL-separated `/proc/<pid>/cmdline`
//!
//! A process whose status cannot be read (exited mid-scan, hidepid) is
//! omitted. An unreadable or empty cmdline becomes an empty token list.

use super::users::{OwnerResolver, SystemUsers};
use super::CollectError;
use crate::snapshot::{ProcessRecord, ProcessSnapshot};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, span, trace, Level};

/// Collect a snapshot of every process visible to the current account.
#[cfg(target_os = "linux")]
pub fn collect_local() -> Result<ProcessSnapshot, CollectError> {
    let host = super::host::local_hostname();
    collect_from_proc(Path::new("/proc"), &host, &mut SystemUsers::new())
}

#[cfg(not(target_os = "linux"))]
pub fn collect_local() -> Result<ProcessSnapshot, CollectError> {
    Err(CollectError::UnsupportedPlatform(
        std::env::consts::OS.to_string(),
    ))
}

/// Collect from a /proc-shaped directory tree.
pub fn collect_from_proc(
    proc_root: &Path,
    host: &str,
    users: &mut dyn OwnerResolver,
) -> Result<ProcessSnapshot, CollectError> {
    let _span = span!(Level::DEBUG, "collect_local", root = %proc_root.display()).entered();
    let start = Instant::now();

    let pids = list_all_pids(proc_root)?;
    let mut processes = Vec::with_capacity(pids.len());
    let mut omitted = 0usize;

    for pid in pids {
        match read_process(proc_root, pid, users) {
            Some(record) => processes.push(record),
            None => omitted += 1,
        }
    }

    debug!(
        process_count = processes.len(),
        omitted,
        duration_ms = start.elapsed().as_millis() as u64,
        "local collection complete"
    );

    Ok(ProcessSnapshot::new(host, processes))
}

/// List all PIDs under the proc root, ascending.
fn list_all_pids(proc_root: &Path) -> Result<Vec<u32>, CollectError> {
    let entries = fs::read_dir(proc_root).map_err(|e| {
        CollectError::Enumeration(format!("cannot read {}: {}", proc_root.display(), e))
    })?;

    let mut pids: Vec<u32> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .collect();

    pids.sort_unstable();
    Ok(pids)
}

fn read_process(proc_root: &Path, pid: u32, users: &mut dyn OwnerResolver) -> Option<ProcessRecord> {
    let dir = proc_root.join(pid.to_string());

    let status = match fs::read_to_string(dir.join("status")) {
        Ok(s) => s,
        Err(e) => {
            trace!(pid, error = %e, "omitting process with unreadable status");
            return None;
        }
    };
    let uid = match parse_uid_from_status(&status) {
        Some(uid) => uid,
        None => {
            trace!(pid, "omitting process without Uid line");
            return None;
        }
    };

    let command_line = fs::read(dir.join("cmdline"))
        .map(|raw| split_cmdline(&raw))
        .unwrap_or_default();

    Some(ProcessRecord::new(pid, users.owner_name(uid), command_line))
}

/// Parse the real UID from /proc/[pid]/status.
///
/// Format: `Uid:\t<real>\t<effective>\t<saved>\t<fs>`
fn parse_uid_from_status(content: &str) -> Option<u32> {
    content
        .lines()
        .find(|line| line.starts_with("Uid:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|uid| uid.parse().ok())
}

/// Split a NUL-separated cmdline into tokens.
///
/// The kernel terminates every argument with NUL; a process that rewrote
/// its argv may leave a single unterminated string instead.
fn split_cmdline(raw: &[u8]) -> Vec<String> {
    let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|b| *b == 0)
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}
