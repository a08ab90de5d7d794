//! Configuration loading and validation.
//!
//! Resolution order (highest to lowest priority):
//! 1. Explicit `--config` path
//! 2. `HPCMAIL_CONFIG` environment variable
//! 3. XDG config home (`~/.config/hpcmail/hpcmail.toml`)
//! 4. Built-in defaults
//!
//! An explicitly named file must exist; the XDG file is optional.

mod validation;

pub use validation::{validate_config, ValidationError};

use crate::address::{AddressPolicy, DEFAULT_PREFERRED_SUFFIX};
use crate::collect::RemoteConfig;
use crate::directory::KeyField;
use crate::notice::DEFAULT_MAX_COMMAND_TOKENS;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "hpcmail";

/// Config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "hpcmail.toml";

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "HPCMAIL_CONFIG";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid TOML in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for hm_common::Error {
    fn from(err: ConfigError) -> Self {
        hm_common::Error::Config(err.to_string())
    }
}

/// Full configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub remote: RemoteConfig,
    pub addresses: AddressConfig,
    pub notice: NoticeConfig,
    pub directory: DirectoryConfig,
}

/// `[addresses]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AddressConfig {
    /// Domain suffix preferred when a user has several addresses.
    pub preferred_suffix: String,
    /// Send to every address instead of the preferred one.
    pub all_addresses: bool,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            preferred_suffix: DEFAULT_PREFERRED_SUFFIX.to_string(),
            all_addresses: false,
        }
    }
}

impl AddressConfig {
    /// Policy in effect; `force_all` is the CLI `--multiple` flag.
    pub fn policy(&self, force_all: bool) -> AddressPolicy {
        if force_all || self.all_addresses {
            AddressPolicy::All
        } else {
            AddressPolicy::PreferredDomainFirst {
                suffix: self.preferred_suffix.clone(),
            }
        }
    }
}

/// `[notice]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoticeConfig {
    /// Command tokens kept per process detail line.
    pub max_command_tokens: usize,
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self {
            max_command_tokens: DEFAULT_MAX_COMMAND_TOKENS,
        }
    }
}

/// `[directory]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoryConfig {
    pub path: Option<PathBuf>,
    pub key_field: KeyField,
}

/// Loaded configuration with provenance information.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: Config,
    /// Path to the config file (None if using defaults).
    pub path: Option<PathBuf>,
    /// SHA-256 of the config file content (None if using defaults).
    pub hash: Option<String>,
}

/// Configuration resolution options.
#[derive(Debug, Default)]
pub struct ConfigOptions {
    /// Explicit config file (highest priority).
    pub config_path: Option<PathBuf>,
}

/// Load configuration with the standard resolution order.
pub fn load_config(options: &ConfigOptions) -> Result<ResolvedConfig, ConfigError> {
    let env_path = std::env::var_os(CONFIG_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let candidate = resolve_config_path(options, env_path, xdg_config_dir());

    let resolved = match candidate {
        Some((path, required)) if required || path.exists() => {
            let (config, hash) = load_config_from_file(&path)?;
            ResolvedConfig {
                config,
                path: Some(path),
                hash: Some(hash),
            }
        }
        _ => ResolvedConfig {
            config: Config::default(),
            path: None,
            hash: None,
        },
    };

    validate_config(&resolved.config)?;
    debug!(
        path = ?resolved.path,
        hash = resolved.hash.as_deref().unwrap_or("defaults"),
        "configuration loaded"
    );
    Ok(resolved)
}

/// Pick the config file to read and whether it must exist.
fn resolve_config_path(
    options: &ConfigOptions,
    env_path: Option<PathBuf>,
    xdg_dir: Option<PathBuf>,
) -> Option<(PathBuf, bool)> {
    // 1. Explicit option
    if let Some(path) = &options.config_path {
        return Some((path.clone(), true));
    }

    // 2. Environment variable
    if let Some(path) = env_path {
        return Some((path, true));
    }

    // 3. XDG config home
    xdg_dir.map(|dir| (dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME), false))
}

fn xdg_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
}

/// Load a config file, returning it with the hex SHA-256 of its content.
pub fn load_config_from_file(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::IoError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let hash = compute_hash(&content);
    let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok((config, hash))
}

fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.remote.ssh_program, "ssh");
        assert_eq!(config.addresses.preferred_suffix, "@hpc.site");
        assert_eq!(config.notice.max_command_tokens, 50);
        assert_eq!(config.directory.key_field, KeyField::Username);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_resolution_order() {
        let explicit = ConfigOptions {
            config_path: Some(PathBuf::from("/a.toml")),
        };
        let env = Some(PathBuf::from("/b.toml"));
        let xdg = Some(PathBuf::from("/home/u/.config"));

        assert_eq!(
            resolve_config_path(&explicit, env.clone(), xdg.clone()),
            Some((PathBuf::from("/a.toml"), true))
        );
        assert_eq!(
            resolve_config_path(&ConfigOptions::default(), env, xdg.clone()),
            Some((PathBuf::from("/b.toml"), true))
        );
        assert_eq!(
            resolve_config_path(&ConfigOptions::default(), None, xdg),
            Some((PathBuf::from("/home/u/.config/hpcmail/hpcmail.toml"), false))
        );
        assert_eq!(resolve_config_path(&ConfigOptions::default(), None, None), None);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpcmail.toml");
        fs::write(
            &path,
            r#"
[remote]
user = "admin"
port = 2222
interpreter = "sudo -n"

[addresses]
preferred_suffix = "@cluster.example"

[directory]
path = "/etc/hpcmail/users.json"
key_field = "uid"
"#,
        )
        .unwrap();

        let resolved = load_config(&ConfigOptions {
            config_path: Some(path.clone()),
        })
        .unwrap();
        let config = resolved.config;
        assert_eq!(config.remote.user.as_deref(), Some("admin"));
        assert_eq!(config.remote.port, Some(2222));
        assert_eq!(config.remote.command_timeout_secs, 120);
        assert_eq!(config.directory.key_field, KeyField::Uid);
        assert_eq!(
            config.addresses.policy(false),
            AddressPolicy::PreferredDomainFirst {
                suffix: "@cluster.example".to_string()
            }
        );
        assert_eq!(config.addresses.policy(true), AddressPolicy::All);
        assert_eq!(resolved.path, Some(path));
        assert_eq!(resolved.hash.map(|h| h.len()), Some(64));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = load_config(&ConfigOptions {
            config_path: Some(PathBuf::from("/nonexistent/hpcmail.toml")),
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpcmail.toml");
        fs::write(&path, "[remote]\nbogus = 1\n").unwrap();
        let err = load_config_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hpcmail.toml");
        fs::write(&path, "[remote]\ncommand_timeout_secs = 0\n").unwrap();
        let err = load_config(&ConfigOptions {
            config_path: Some(path),
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
