//! Recipient resolution.
//!
//! Cross-references a process snapshot (or an explicit user list) with the
//! user directory to decide who gets notified.

use crate::directory::{User, UserDirectory};
use crate::snapshot::{ProcessRecord, ProcessSnapshot};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Whether each recipient carries the processes they own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessDetail {
    #[default]
    Omit,
    Include,
}

/// A resolved user and (optionally) their processes, in snapshot order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipient {
    pub user: User,
    pub processes: Vec<ProcessRecord>,
}

/// Ordered recipients.
pub type RecipientSet = Vec<Recipient>;

/// An explicitly named user with no directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownUser {
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Resolution {
    pub recipients: RecipientSet,
    pub unknown_users: Vec<UnknownUser>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Compute the notify-set.
///
/// Explicit users are looked up by the directory's key field and taken
/// verbatim (order and duplicates kept); otherwise the targets are the
/// distinct owners in the snapshot that have a directory entry, minus
/// `invoker`, in sorted order. Process detail always matches on the
/// resolved username.
pub fn resolve(
    snapshot: Option<&ProcessSnapshot>,
    directory: &dyn UserDirectory,
    explicit_users: &[String],
    invoker: &str,
    detail: ProcessDetail,
) -> Resolution {
    let mut resolution = Resolution::default();

    let users: Vec<&User> = if explicit_users.is_empty() {
        snapshot_users(snapshot, directory, invoker)
    } else {
        let mut found = Vec::with_capacity(explicit_users.len());
        for key in explicit_users {
            match directory.lookup(key) {
                Some(user) => found.push(user),
                None => {
                    warn!(user = %key, "explicit user not found in directory");
                    resolution.unknown_users.push(UnknownUser {
                        username: key.clone(),
                    });
                }
            }
        }
        found
    };

    for user in users {
        let processes = match (detail, snapshot) {
            (ProcessDetail::Include, Some(snap)) => snap.owned_by(&user.username).cloned().collect(),
            _ => Vec::new(),
        };
        resolution.recipients.push(Recipient {
            user: user.clone(),
            processes,
        });
    }

    debug!(
        recipients = resolution.recipients.len(),
        unknown = resolution.unknown_users.len(),
        explicit = !explicit_users.is_empty(),
        "recipients resolved"
    );
    resolution
}

/// Directory entries for the snapshot's owners, sorted by owner name.
fn snapshot_users<'d>(
    snapshot: Option<&ProcessSnapshot>,
    directory: &'d dyn UserDirectory,
    invoker: &str,
) -> Vec<&'d User> {
    let Some(snapshot) = snapshot else {
        return Vec::new();
    };
    let owners: BTreeSet<&str> = snapshot
        .processes
        .iter()
        .map(|p| p.owner.as_str())
        .filter(|owner| *owner != invoker)
        .collect();
    owners
        .into_iter()
        .filter_map(|owner| directory.lookup_username(owner))
        .collect()
}
