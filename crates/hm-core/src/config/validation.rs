//! Semantic validation for configuration files.

use thiserror::Error;

use super::Config;

/// Errors that can occur during semantic validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be positive")]
    ZeroValue { field: &'static str },

    #[error("remote agent path must be absolute (got {path})")]
    RelativeAgentPath { path: String },

    #[error("preferred address suffix must not be empty")]
    EmptySuffix,

    #[error("ssh program must not be empty")]
    EmptySshProgram,
}

/// Validate a loaded configuration.
pub fn validate_config(config: &Config) -> Result<(), ValidationError> {
    let remote = &config.remote;

    if remote.ssh_program.trim().is_empty() {
        return Err(ValidationError::EmptySshProgram);
    }
    if remote.connect_timeout_secs == 0 {
        return Err(ValidationError::ZeroValue {
            field: "remote.connect_timeout_secs",
        });
    }
    if remote.command_timeout_secs == 0 {
        return Err(ValidationError::ZeroValue {
            field: "remote.command_timeout_secs",
        });
    }
    if remote.max_output_bytes == 0 {
        return Err(ValidationError::ZeroValue {
            field: "remote.max_output_bytes",
        });
    }
    if !remote.remote_agent_path.starts_with('/') {
        return Err(ValidationError::RelativeAgentPath {
            path: remote.remote_agent_path.clone(),
        });
    }
    if config.addresses.preferred_suffix.is_empty() {
        return Err(ValidationError::EmptySuffix);
    }
    if config.notice.max_command_tokens == 0 {
        return Err(ValidationError::ZeroValue {
            field: "notice.max_command_tokens",
        });
    }

    Ok(())
}
