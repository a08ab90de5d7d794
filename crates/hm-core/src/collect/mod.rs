//! Process snapshot collection.
//!
//! A snapshot is taken either directly from the local /proc table or by
//! running this program as an agent on a remote host over ssh.

pub mod host;
pub mod local;
pub mod remote;
pub mod runner;
pub mod users;

pub use host::{collect_snapshot, local_hostname, HostTarget};
pub use local::{collect_from_proc, collect_local};
pub use remote::{collect_remote, RemoteConfig, RemoteFile, SshSession};
pub use runner::{run_command, CommandOutput, CommandSpec, RunnerError};
pub use users::{invoking_user, lookup_user_name, OwnerResolver, SystemUsers};

use crate::snapshot::CodecError;
use thiserror::Error;

/// Failure while collecting a snapshot.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("process enumeration failed: {0}")]
    Enumeration(String),

    #[error("local collection is not supported on {0}")]
    UnsupportedPlatform(String),

    #[error("ssh connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    #[error("agent transfer to {host} failed: {message}")]
    Transfer { host: String, message: String },

    #[error("remote agent on {host} failed: {message}")]
    Execution { host: String, message: String },

    #[error("malformed process snapshot from {host}: {source}")]
    MalformedSnapshot {
        host: String,
        #[source]
        source: CodecError,
    },
}

impl From<CollectError> for hm_common::Error {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::Enumeration(message) => hm_common::Error::Enumeration(message),
            CollectError::UnsupportedPlatform(os) => hm_common::Error::UnsupportedPlatform(os),
            CollectError::Connection { host, message } => {
                hm_common::Error::Connection { host, message }
            }
            CollectError::Transfer { host, message } => hm_common::Error::Transfer { host, message },
            CollectError::Execution { host, message } => {
                hm_common::Error::Execution { host, message }
            }
            CollectError::MalformedSnapshot { host, source } => {
                hm_common::Error::MalformedSnapshot {
                    host,
                    message: source.to_string(),
                }
            }
        }
    }
}
