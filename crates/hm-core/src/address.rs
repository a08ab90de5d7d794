//! Address selection and mailbox formatting.

use crate::directory::User;
use serde::{Deserialize, Serialize};

/// Which of a user's addresses receive the notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AddressPolicy {
    /// Every stored address, in order.
    All,
    /// The first address ending in `suffix`, else the first address.
    PreferredDomainFirst { suffix: String },
}

impl Default for AddressPolicy {
    fn default() -> Self {
        AddressPolicy::PreferredDomainFirst {
            suffix: DEFAULT_PREFERRED_SUFFIX.to_string(),
        }
    }
}

pub const DEFAULT_PREFERRED_SUFFIX: &str = "@hpc.site";

/// Pick the addresses for `user`. Never empty.
pub fn select_addresses(user: &User, policy: &AddressPolicy) -> Vec<String> {
    let emails = user.emails();
    match policy {
        AddressPolicy::All => emails.to_vec(),
        AddressPolicy::PreferredDomainFirst { suffix } => {
            let chosen = emails
                .iter()
                .find(|addr| addr.ends_with(suffix.as_str()))
                .unwrap_or(&emails[0]);
            vec![chosen.clone()]
        }
    }
}

/// Render `addr` as an RFC 5322 mailbox with the user's full name.
///
/// The display name is quoted only when it contains specials.
pub fn format_mailbox(user: &User, addr: &str) -> String {
    match user.full_name() {
        Some(name) => format!("{} <{}>", display_name(&name), addr),
        None => addr.to_string(),
    }
}

/// All selected mailboxes of `user`, comma-joined.
pub fn mailboxes(user: &User, policy: &AddressPolicy) -> String {
    select_addresses(user, policy)
        .iter()
        .map(|addr| format_mailbox(user, addr))
        .collect::<Vec<_>>()
        .join(", ")
}

const SPECIALS: &[char] = &['(', ')', '<', '>', '@', ',', ':', ';', '.', '\\', '"', '[', ']'];

fn display_name(name: &str) -> String {
    if name.contains(SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\"", escaped)
    } else {
        name.to_string()
    }
}
