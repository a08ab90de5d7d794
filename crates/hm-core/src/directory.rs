//! User directory: who can be notified, and at which addresses.
//!
//! The directory file is a JSON array of user objects:
//!
//! ```json
//! [
//!   {"uid": 1000, "username": "alice", "first_name": "Alice",
//!    "last_name": "Smith", "emails": ["alice@hpc.site", "alice@example.org"]}
//! ]
//! ```
//!
//! Entries are indexed on one key field (username by default). With the
//! `email` key field every address of a user is a key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Directory loading and validation errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse directory {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("user {username} has no email address")]
    NoEmails { username: String },

    #[error("user entry has an empty username")]
    EmptyUsername,

    #[error("duplicate directory key: {key}")]
    DuplicateKey { key: String },
}

impl From<DirectoryError> for hm_common::Error {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Io { source, .. } => hm_common::Error::Io(source),
            DirectoryError::DuplicateKey { key } => hm_common::Error::DuplicateDirectoryKey { key },
            other => hm_common::Error::InvalidDirectory(other.to_string()),
        }
    }
}

/// A directory entry. `emails` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUser")]
pub struct User {
    pub uid: u32,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    emails: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUser {
    uid: u32,
    username: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    emails: Vec<String>,
}

impl TryFrom<RawUser> for User {
    type Error = DirectoryError;

    fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
        User::new(raw.uid, raw.username, raw.first_name, raw.last_name, raw.emails)
    }
}

impl User {
    pub fn new(
        uid: u32,
        username: impl Into<String>,
        first_name: Option<String>,
        last_name: Option<String>,
        emails: Vec<String>,
    ) -> Result<Self, DirectoryError> {
        let username = username.into();
        if username.is_empty() {
            return Err(DirectoryError::EmptyUsername);
        }
        let emails: Vec<String> = emails
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if emails.is_empty() {
            return Err(DirectoryError::NoEmails { username });
        }
        Ok(Self {
            uid,
            username,
            first_name,
            last_name,
            emails,
        })
    }

    /// Addresses in stored order (non-empty).
    pub fn emails(&self) -> &[String] {
        &self.emails
    }

    /// `first last` when both parts are present and non-empty.
    pub fn full_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
                Some(format!("{} {}", first, last))
            }
            _ => None,
        }
    }
}

/// Which user field the directory is keyed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeyField {
    #[default]
    Username,
    Uid,
    Email,
}

impl KeyField {
    fn keys(self, user: &User) -> Vec<String> {
        match self {
            KeyField::Username => vec![user.username.clone()],
            KeyField::Uid => vec![user.uid.to_string()],
            KeyField::Email => user.emails.clone(),
        }
    }
}

impl std::fmt::Display for KeyField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyField::Username => write!(f, "username"),
            KeyField::Uid => write!(f, "uid"),
            KeyField::Email => write!(f, "email"),
        }
    }
}

/// Read-only user lookup.
pub trait UserDirectory {
    /// Find a user by the directory's key field.
    fn lookup(&self, key: &str) -> Option<&User>;

    /// Find a user by login name, whatever the key field is.
    ///
    /// Process owners are always login names, so snapshot matching goes
    /// through here rather than [`UserDirectory::lookup`].
    fn lookup_username(&self, username: &str) -> Option<&User>;
}

/// In-memory directory indexed on a [`KeyField`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    key_field: KeyField,
    users: Vec<User>,
    index: HashMap<String, usize>,
    by_username: HashMap<String, usize>,
}

impl MemoryDirectory {
    /// Build a directory, rejecting duplicate keys.
    pub fn new(users: Vec<User>, key_field: KeyField) -> Result<Self, DirectoryError> {
        let mut index = HashMap::with_capacity(users.len());
        let mut by_username = HashMap::with_capacity(users.len());
        for (i, user) in users.iter().enumerate() {
            for key in key_field.keys(user) {
                if index.insert(key.clone(), i).is_some() {
                    return Err(DirectoryError::DuplicateKey { key });
                }
            }
            // First entry wins when a non-username key allows repeats.
            by_username.entry(user.username.clone()).or_insert(i);
        }
        Ok(Self {
            key_field,
            users,
            index,
            by_username,
        })
    }

    pub fn key_field(&self) -> KeyField {
        self.key_field
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserDirectory for MemoryDirectory {
    fn lookup(&self, key: &str) -> Option<&User> {
        self.index.get(key).map(|&i| &self.users[i])
    }

    fn lookup_username(&self, username: &str) -> Option<&User> {
        self.by_username.get(username).map(|&i| &self.users[i])
    }
}

/// Load a JSON directory file.
pub fn load_directory(path: &Path, key_field: KeyField) -> Result<MemoryDirectory, DirectoryError> {
    debug!(path = %path.display(), key_field = %key_field, "loading user directory");
    let content = fs::read_to_string(path).map_err(|source| DirectoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let directory = parse_directory(&content, key_field).map_err(|err| match err {
        DirectoryError::Parse { source, .. } => DirectoryError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    info!(path = %path.display(), users = directory.len(), "user directory loaded");
    Ok(directory)
}

/// Parse directory JSON text.
pub fn parse_directory(content: &str, key_field: KeyField) -> Result<MemoryDirectory, DirectoryError> {
    let users: Vec<User> = serde_json::from_str(content).map_err(|source| DirectoryError::Parse {
        path: PathBuf::new(),
        source,
    })?;
    MemoryDirectory::new(users, key_field)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"uid": 1000, "username": "alice", "first_name": "Alice", "last_name": "Smith",
         "emails": ["alice@other.org", "alice@hpc.site"]},
        {"uid": 1001, "username": "bob", "emails": ["bob@hpc.site"]},
        {"uid": 1002, "username": "carol", "first_name": "Carol", "last_name": "",
         "emails": ["carol@hpc.site"]}
    ]"#;

    #[test]
    fn test_parse_and_lookup() {
        let dir = parse_directory(SAMPLE, KeyField::Username).unwrap();
        assert_eq!(dir.len(), 3);
        let alice = dir.lookup("alice").unwrap();
        assert_eq!(alice.uid, 1000);
        assert_eq!(alice.emails(), ["alice@other.org", "alice@hpc.site"]);
        assert!(dir.lookup("dave").is_none());
    }

    #[test]
    fn test_full_name_requires_both_parts() {
        let dir = parse_directory(SAMPLE, KeyField::Username).unwrap();
        assert_eq!(dir.lookup("alice").unwrap().full_name().as_deref(), Some("Alice Smith"));
        assert_eq!(dir.lookup("bob").unwrap().full_name(), None);
        assert_eq!(dir.lookup("carol").unwrap().full_name(), None);
    }

    #[test]
    fn test_uid_and_email_keys() {
        let by_uid = parse_directory(SAMPLE, KeyField::Uid).unwrap();
        assert_eq!(by_uid.lookup("1001").unwrap().username, "bob");
        assert!(by_uid.lookup("bob").is_none());

        let by_email = parse_directory(SAMPLE, KeyField::Email).unwrap();
        assert_eq!(by_email.lookup("alice@hpc.site").unwrap().username, "alice");
        assert_eq!(by_email.lookup("alice@other.org").unwrap().username, "alice");
    }

    #[test]
    fn test_username_lookup_ignores_key_field() {
        for key_field in [KeyField::Username, KeyField::Uid, KeyField::Email] {
            let dir = parse_directory(SAMPLE, key_field).unwrap();
            assert_eq!(dir.lookup_username("carol").unwrap().uid, 1002, "{key_field}");
            assert!(dir.lookup_username("1002").is_none(), "{key_field}");
        }
    }

    #[test]
    fn test_empty_emails_rejected() {
        let err = User::new(1, "x", None, None, vec![]).unwrap_err();
        assert!(matches!(err, DirectoryError::NoEmails { .. }));
        let err = User::new(1, "x", None, None, vec!["  ".to_string()]).unwrap_err();
        assert!(matches!(err, DirectoryError::NoEmails { .. }));

        let json = r#"[{"uid": 1, "username": "x", "emails": []}]"#;
        assert!(matches!(
            parse_directory(json, KeyField::Username),
            Err(DirectoryError::Parse { .. })
        ));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let json = r#"[
            {"uid": 1, "username": "x", "emails": ["x@a"]},
            {"uid": 2, "username": "x", "emails": ["x@b"]}
        ]"#;
        let err = parse_directory(json, KeyField::Username).unwrap_err();
        assert!(matches!(err, DirectoryError::DuplicateKey { ref key } if key == "x"));
        // Same file is fine when keyed on uid.
        assert!(parse_directory(json, KeyField::Uid).is_ok());
    }

    #[test]
    fn test_load_directory_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, SAMPLE).unwrap();
        let loaded = load_directory(&path, KeyField::Username).unwrap();
        assert!(loaded.lookup("bob").is_some());

        let missing = load_directory(&dir.path().join("nope.json"), KeyField::Username).unwrap_err();
        assert!(matches!(missing, DirectoryError::Io { .. }));

        fs::write(&path, "{not json").unwrap();
        let bad = load_directory(&path, KeyField::Username).unwrap_err();
        match bad {
            DirectoryError::Parse { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_conversion() {
        let err: hm_common::Error = DirectoryError::DuplicateKey { key: "x".into() }.into();
        assert_eq!(err.code(), 12);
        let err: hm_common::Error = DirectoryError::NoEmails { username: "x".into() }.into();
        assert_eq!(err.code(), 11);
    }
}
