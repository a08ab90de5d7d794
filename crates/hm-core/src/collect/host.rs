//! Collection targets and local/remote dispatch.

use super::local::collect_local;
use super::remote::{collect_remote, RemoteConfig};
use super::CollectError;
use crate::snapshot::ProcessSnapshot;
use std::path::PathBuf;
use tracing::debug;

/// A host to snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub address: String,
    /// True when the address names the machine we are running on.
    pub is_local: bool,
    pub identity: Option<PathBuf>,
}

impl HostTarget {
    /// Build a target, classifying the address against the local hostname.
    pub fn new(address: impl Into<String>, identity: Option<PathBuf>) -> Self {
        let address = address.into();
        let is_local = is_local_address(&address, &local_hostname());
        Self {
            address,
            is_local,
            identity,
        }
    }

    /// The machine we are running on.
    pub fn local() -> Self {
        Self {
            address: local_hostname(),
            is_local: true,
            identity: None,
        }
    }
}

/// Hostname of this machine, lossily decoded.
pub fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

fn is_local_address(address: &str, hostname: &str) -> bool {
    address.eq_ignore_ascii_case(hostname) || address.eq_ignore_ascii_case("localhost")
}

/// Take a snapshot of `target`, locally or over ssh.
pub fn collect_snapshot(
    target: &HostTarget,
    config: &RemoteConfig,
) -> Result<ProcessSnapshot, CollectError> {
    if target.is_local {
        debug!(host = %target.address, "collecting from local process table");
        collect_local()
    } else {
        collect_remote(target, config)
    }
}
