//! Snapshot record types.

use hm_common::ProcessId;
use serde::{Deserialize, Serialize};

/// A single process observed on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    /// Process ID.
    pub pid: ProcessId,

    /// Owning user name (numeric uid text when the name is unresolvable).
    pub owner: String,

    /// Command line tokens. Empty for kernel threads and zombies.
    pub command_line: Vec<String>,
}

impl ProcessRecord {
    pub fn new(pid: u32, owner: impl Into<String>, command_line: Vec<String>) -> Self {
        Self {
            pid: ProcessId(pid),
            owner: owner.into(),
            command_line,
        }
    }

    /// Command line joined with spaces, keeping at most `max_tokens` tokens.
    pub fn command_summary(&self, max_tokens: usize) -> String {
        self.command_line
            .iter()
            .take(max_tokens)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Ordered process list captured on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Host name the snapshot was captured on.
    pub host: String,

    /// Records in enumeration order.
    pub processes: Vec<ProcessRecord>,
}

impl ProcessSnapshot {
    pub fn new(host: impl Into<String>, processes: Vec<ProcessRecord>) -> Self {
        Self {
            host: host.into(),
            processes,
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Records owned by `owner`, in snapshot order.
    pub fn owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a ProcessRecord> + 'a {
        self.processes.iter().filter(move |p| p.owner == owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_summary_truncates_tokens() {
        let p = ProcessRecord::new(
            10,
            "alice",
            vec!["python".into(), "train.py".into(), "--epochs".into(), "90".into()],
        );
        assert_eq!(p.command_summary(50), "python train.py --epochs 90");
        assert_eq!(p.command_summary(2), "python train.py");
        assert_eq!(p.command_summary(0), "");
    }

    #[test]
    fn test_command_summary_empty_command_line() {
        let p = ProcessRecord::new(2, "root", Vec::new());
        assert_eq!(p.command_summary(50), "");
    }

    #[test]
    fn test_owned_by_preserves_order() {
        let snap = ProcessSnapshot::new(
            "n1",
            vec![
                ProcessRecord::new(3, "bob", vec![]),
                ProcessRecord::new(1, "alice", vec![]),
                ProcessRecord::new(2, "bob", vec![]),
            ],
        );
        let pids: Vec<u32> = snap.owned_by("bob").map(|p| p.pid.0).collect();
        assert_eq!(pids, vec![3, 2]);
        assert_eq!(snap.owned_by("carol").count(), 0);
    }
}
