//! Notice plans: what the external mailer sends, and to whom.
//!
//! Individual mode yields one entry per recipient with their mailboxes and
//! an optional process addendum. Bulk mode yields one comma-joined mailbox
//! list for a single BCC message.

use crate::address::{mailboxes, AddressPolicy};
use crate::resolve::{Recipient, Resolution, UnknownUser};
use crate::snapshot::ProcessRecord;
use serde::Serialize;
use std::fmt::Write as _;

/// Default number of command tokens shown per process.
pub const DEFAULT_MAX_COMMAND_TOKENS: usize = 50;

/// Heading of the process addendum.
pub const ADDENDUM_HEADER: &str = "\nYou currently own the following processes:\n\n";

/// `PID <pid> - <first max_tokens command tokens>`
pub fn detail_line(process: &ProcessRecord, max_tokens: usize) -> String {
    format!("PID {} - {}", process.pid, process.command_summary(max_tokens))
}

/// Addendum block listing `processes`, one tab-indented line each.
pub fn process_addendum(processes: &[ProcessRecord], max_tokens: usize) -> String {
    let mut out = String::from(ADDENDUM_HEADER);
    for process in processes {
        // Writing to a String cannot fail.
        let _ = writeln!(out, "\t{}", detail_line(process, max_tokens));
    }
    out
}

/// Message plan for a single recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualNotice {
    pub username: String,
    pub full_name: Option<String>,
    /// Comma-joined mailboxes for the To header.
    pub to: String,
    pub processes: Vec<String>,
    pub addendum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NoticePlan {
    Individual {
        host: Option<String>,
        notices: Vec<IndividualNotice>,
        unknown_users: Vec<UnknownUser>,
    },
    Bulk {
        host: Option<String>,
        bcc: String,
        unknown_users: Vec<UnknownUser>,
    },
}

/// Options that shape a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOptions {
    pub policy: AddressPolicy,
    pub include_processes: bool,
    pub max_command_tokens: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            policy: AddressPolicy::default(),
            include_processes: false,
            max_command_tokens: DEFAULT_MAX_COMMAND_TOKENS,
        }
    }
}

impl NoticePlan {
    /// One notice per recipient.
    pub fn individual(resolution: &Resolution, host: Option<&str>, options: &PlanOptions) -> Self {
        let notices = resolution
            .recipients
            .iter()
            .map(|r| individual_notice(r, options))
            .collect();
        NoticePlan::Individual {
            host: host.map(String::from),
            notices,
            unknown_users: resolution.unknown_users.clone(),
        }
    }

    /// One message to everyone.
    pub fn bulk(resolution: &Resolution, host: Option<&str>, policy: &AddressPolicy) -> Self {
        NoticePlan::Bulk {
            host: host.map(String::from),
            bcc: bulk_recipients(resolution, policy),
            unknown_users: resolution.unknown_users.clone(),
        }
    }

    pub fn unknown_users(&self) -> &[UnknownUser] {
        match self {
            NoticePlan::Individual { unknown_users, .. } | NoticePlan::Bulk { unknown_users, .. } => {
                unknown_users
            }
        }
    }

    /// Markdown rendering for people.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        match self {
            NoticePlan::Individual {
                host,
                notices,
                unknown_users,
            } => {
                let _ = writeln!(out, "# Maintenance notices{}\n", host_suffix(host));
                if notices.is_empty() {
                    out.push_str("No recipients.\n");
                }
                for notice in notices {
                    let _ = writeln!(out, "## {}\n", notice.username);
                    let _ = writeln!(out, "- To: {}", notice.to);
                    if !notice.processes.is_empty() {
                        let _ = writeln!(out, "- Processes:");
                        for line in &notice.processes {
                            let _ = writeln!(out, "  - `{}`", line);
                        }
                    }
                    out.push('\n');
                }
                write_unknown(&mut out, unknown_users);
            }
            NoticePlan::Bulk {
                host,
                bcc,
                unknown_users,
            } => {
                let _ = writeln!(out, "# Maintenance notice{}\n", host_suffix(host));
                if bcc.is_empty() {
                    out.push_str("No recipients.\n");
                } else {
                    let _ = writeln!(out, "- Bcc: {}", bcc);
                }
                write_unknown(&mut out, unknown_users);
            }
        }
        out
    }
}

/// Comma-joined mailboxes of every recipient.
pub fn bulk_recipients(resolution: &Resolution, policy: &AddressPolicy) -> String {
    resolution
        .recipients
        .iter()
        .map(|r| mailboxes(&r.user, policy))
        .collect::<Vec<_>>()
        .join(", ")
}

fn individual_notice(recipient: &Recipient, options: &PlanOptions) -> IndividualNotice {
    let (processes, addendum) = if options.include_processes {
        (
            recipient
                .processes
                .iter()
                .map(|p| detail_line(p, options.max_command_tokens))
                .collect(),
            process_addendum(&recipient.processes, options.max_command_tokens),
        )
    } else {
        (Vec::new(), String::new())
    };

    IndividualNotice {
        username: recipient.user.username.clone(),
        full_name: recipient.user.full_name(),
        to: mailboxes(&recipient.user, &options.policy),
        processes,
        addendum,
    }
}

fn host_suffix(host: &Option<String>) -> String {
    host.as_deref().map(|h| format!(" for {}", h)).unwrap_or_default()
}

fn write_unknown(out: &mut String, unknown: &[UnknownUser]) {
    if unknown.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n## Unknown users\n");
    for u in unknown {
        let _ = writeln!(out, "- {}", u.username);
    }
}
