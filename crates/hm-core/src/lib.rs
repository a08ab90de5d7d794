//! hpcmail core library
//!
//! This library provides the process-snapshot core of the maintenance
//! notifier:
//! - Snapshot wire format (codec)
//! - Local and remote (ssh agent) process collection
//! - User directory loading and lookup
//! - Recipient resolution and address selection
//! - Notice plans for the external mailer
//! - Configuration, logging and exit codes for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod address;
pub mod collect;
pub mod config;
pub mod directory;
pub mod exit_codes;
pub mod logging;
pub mod notice;
pub mod resolve;
pub mod snapshot;

pub use address::{format_mailbox, select_addresses, AddressPolicy};
pub use collect::{collect_snapshot, CollectError, HostTarget, RemoteConfig};
pub use directory::{load_directory, KeyField, MemoryDirectory, User, UserDirectory};
pub use notice::NoticePlan;
pub use resolve::{resolve, ProcessDetail, Recipient, RecipientSet, Resolution, UnknownUser};
pub use snapshot::{ProcessRecord, ProcessSnapshot};
