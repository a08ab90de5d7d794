//! Exit codes for the hpcmail CLI.
//!
//! Exit code ranges:
//! - 0-3: Operational outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use hm_common::{Error, ErrorCategory};

/// Exit codes for hpcmail operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-3)
    // ========================================================================
    /// Recipients produced
    Clean = 0,

    /// Nobody to notify
    NothingToDo = 1,

    /// Some explicitly named users are not in the directory
    PartialUnknown = 3,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Configuration file missing, unparsable or invalid
    ConfigError = 11,

    /// User directory missing or invalid
    DirectoryError = 12,

    /// Local process enumeration failed
    CollectionError = 13,

    /// ssh connection, transfer, agent run or decode failed
    RemoteError = 14,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0-1: the run did what was asked.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::NothingToDo)
    }

    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::NothingToDo => "OK_NOTHING",
            ExitCode::PartialUnknown => "ERR_PARTIAL_UNKNOWN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::DirectoryError => "ERR_DIRECTORY",
            ExitCode::CollectionError => "ERR_COLLECTION",
            ExitCode::RemoteError => "ERR_REMOTE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Directory => ExitCode::DirectoryError,
            ErrorCategory::Collection | ErrorCategory::Platform => ExitCode::CollectionError,
            ErrorCategory::Remote => ExitCode::RemoteError,
            ErrorCategory::Resolution => ExitCode::PartialUnknown,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::NothingToDo.is_success());
        assert!(ExitCode::PartialUnknown.is_operational());
        assert!(!ExitCode::PartialUnknown.is_success());
        assert!(ExitCode::RemoteError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert_eq!(i32::from(ExitCode::DirectoryError), 12);
    }

    #[test]
    fn test_error_mapping() {
        let remote = Error::Connection {
            host: "n1".into(),
            message: "refused".into(),
        };
        assert_eq!(ExitCode::from(&remote), ExitCode::RemoteError);
        assert_eq!(
            ExitCode::from(&Error::Enumeration("x".into())),
            ExitCode::CollectionError
        );
        assert_eq!(
            ExitCode::from(&Error::InvalidDirectory("x".into())),
            ExitCode::DirectoryError
        );
        assert_eq!(ExitCode::from(&Error::Config("x".into())), ExitCode::ConfigError);
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::RemoteError.to_string(), "ERR_REMOTE (14)");
    }
}
