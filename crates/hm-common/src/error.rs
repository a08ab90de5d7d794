//! Error types for hpcmail.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Remote Connection Failed
//!   Reason: ssh connection to node17 failed: Permission denied (publickey)
//!   Fix: Pass an identity with '--identity', or load a key into ssh-agent.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 21,
//!   "category": "remote",
//!   "message": "ssh connection to node17 failed: Permission denied (publickey)",
//!   "recoverable": true,
//!   "suggested_action": "manual_intervention",
//!   "context": { "host": "node17" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for hpcmail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// User directory errors.
    Directory,
    /// Local process enumeration errors.
    Collection,
    /// Remote session, transfer, and agent errors.
    Remote,
    /// Recipient resolution conditions.
    Resolution,
    /// File I/O and serialization errors.
    Io,
    /// Platform compatibility errors.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Directory => write!(f, "directory"),
            ErrorCategory::Collection => write!(f, "collection"),
            ErrorCategory::Remote => write!(f, "remote"),
            ErrorCategory::Resolution => write!(f, "resolution"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Suggested actions for callers to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation (possibly with backoff).
    Retry,
    /// Fix the configuration file.
    FixConfig,
    /// Fix the user directory.
    FixDirectory,
    /// Skip this host or user and continue.
    Skip,
    /// Request elevated privileges.
    Elevate,
    /// Abort the operation.
    Abort,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::FixConfig => write!(f, "fix_config"),
            SuggestedAction::FixDirectory => write!(f, "fix_directory"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::Elevate => write!(f, "elevate"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for hpcmail.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid user directory: {0}")]
    InvalidDirectory(String),

    #[error("duplicate user directory key: {key}")]
    DuplicateDirectoryKey { key: String },

    // Collection errors (20-29)
    #[error("process enumeration failed: {0}")]
    Enumeration(String),

    #[error("ssh connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    #[error("agent transfer to {host} failed: {message}")]
    Transfer { host: String, message: String },

    #[error("remote agent on {host} failed: {message}")]
    Execution { host: String, message: String },

    #[error("malformed process snapshot from {host}: {message}")]
    MalformedSnapshot { host: String, message: String },

    // Resolution conditions (30-39)
    #[error("user {username} not found in directory")]
    UnknownUser { username: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(String),

    // Platform errors (70-79)
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration and directory errors
    /// - 20-29: Collection errors (local and remote)
    /// - 30-39: Resolution conditions
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidDirectory(_) => 11,
            Error::DuplicateDirectoryKey { .. } => 12,
            Error::Enumeration(_) => 20,
            Error::Connection { .. } => 21,
            Error::Transfer { .. } => 22,
            Error::Execution { .. } => 23,
            Error::MalformedSnapshot { .. } => 24,
            Error::UnknownUser { .. } => 30,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Encoding(_) => 62,
            Error::UnsupportedPlatform(_) => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,

            Error::InvalidDirectory(_) | Error::DuplicateDirectoryKey { .. } => {
                ErrorCategory::Directory
            }

            Error::Enumeration(_) => ErrorCategory::Collection,

            Error::Connection { .. }
            | Error::Transfer { .. }
            | Error::Execution { .. }
            | Error::MalformedSnapshot { .. } => ErrorCategory::Remote,

            Error::UnknownUser { .. } => ErrorCategory::Resolution,

            Error::Io(_) | Error::Json(_) | Error::Encoding(_) => ErrorCategory::Io,

            Error::UnsupportedPlatform(_) => ErrorCategory::Platform,
        }
    }

    /// Returns whether this error is potentially recoverable.
    ///
    /// The core never retries; this only tells the caller whether a retry
    /// or a fix on their side could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::InvalidDirectory(_) => true,
            Error::DuplicateDirectoryKey { .. } => true,

            // /proc unreadable is an environment problem
            Error::Enumeration(_) => false,

            Error::Connection { .. } => true,
            Error::Transfer { .. } => true,
            Error::Execution { .. } => true,
            // A corrupted stream usually means the remote shell prints to stdout
            Error::MalformedSnapshot { .. } => false,

            Error::UnknownUser { .. } => true,

            Error::Io(_) => true,
            Error::Json(_) => true,
            Error::Encoding(_) => false,

            Error::UnsupportedPlatform(_) => false,
        }
    }

    /// Returns the suggested action for automation.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::FixConfig,
            Error::InvalidDirectory(_) => SuggestedAction::FixDirectory,
            Error::DuplicateDirectoryKey { .. } => SuggestedAction::FixDirectory,

            Error::Enumeration(_) => SuggestedAction::Elevate,

            Error::Connection { .. } => SuggestedAction::ManualIntervention,
            Error::Transfer { .. } => SuggestedAction::Retry,
            Error::Execution { .. } => SuggestedAction::Skip,
            Error::MalformedSnapshot { .. } => SuggestedAction::ManualIntervention,

            Error::UnknownUser { .. } => SuggestedAction::Skip,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
            Error::Encoding(_) => SuggestedAction::Abort,

            Error::UnsupportedPlatform(_) => SuggestedAction::Abort,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Check hpcmail.toml syntax, or remove it to fall back to built-in defaults."
            }
            Error::InvalidDirectory(_) => {
                "Every directory entry needs a username, a uid, and at least one email address."
            }
            Error::DuplicateDirectoryKey { .. } => {
                "Directory keys must be unique. Remove the duplicate entry or choose another --key-field."
            }

            Error::Enumeration(_) => {
                "Make sure /proc is mounted and readable by the invoking account."
            }

            Error::Connection { .. } => {
                "Pass an identity with '--identity', or load a key into ssh-agent. Check that the host is reachable."
            }
            Error::Transfer { .. } => {
                "Check free space and permissions of the remote agent directory (default /tmp)."
            }
            Error::Execution { .. } => {
                "Check that the agent runs on the remote host (architecture, noexec /tmp, interpreter path)."
            }
            Error::MalformedSnapshot { .. } => {
                "The remote agent output was truncated or corrupted. Make sure nothing else writes to stdout on the remote side."
            }

            Error::UnknownUser { .. } => {
                "Add the user to the directory file, or drop them from the command line."
            }

            Error::Io(_) => "Check file paths and permissions, then retry the operation.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq . <file>'.",
            Error::Encoding(_) => {
                "A process field exceeds the snapshot format limits. Report the offending command line."
            }

            Error::UnsupportedPlatform(_) => {
                "Local process collection requires Linux /proc. Collect from a Linux host with '--host'."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidDirectory(_) => "Invalid User Directory",
            Error::DuplicateDirectoryKey { .. } => "Duplicate Directory Key",

            Error::Enumeration(_) => "Process Enumeration Failed",

            Error::Connection { .. } => "Remote Connection Failed",
            Error::Transfer { .. } => "Agent Transfer Failed",
            Error::Execution { .. } => "Remote Agent Failed",
            Error::MalformedSnapshot { .. } => "Malformed Process Snapshot",

            Error::UnknownUser { .. } => "Unknown User",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
            Error::Encoding(_) => "Snapshot Encoding Failed",

            Error::UnsupportedPlatform(_) => "Unsupported Platform",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for automation.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., host, username).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::Connection { host, .. }
            | Error::Transfer { host, .. }
            | Error::Execution { host, .. }
            | Error::MalformedSnapshot { host, .. } => {
                context.insert("host".to_string(), serde_json::json!(host));
            }
            Error::UnknownUser { username } => {
                context.insert("username".to_string(), serde_json::json!(username));
            }
            Error::DuplicateDirectoryKey { key } => {
                context.insert("key".to_string(), serde_json::json!(key));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
