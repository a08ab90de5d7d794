//! CLI tests for the hpcmail binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a Command for the hpcmail binary with a config-free environment.
fn hpcmail(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("hpcmail").expect("hpcmail binary should exist");
    cmd.env_remove("HPCMAIL_CONFIG")
        .env_remove("HPCMAIL_LOG")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", home.path());
    cmd
}

const USERS: &str = r#"[
    {"uid": 1001, "username": "carol", "first_name": "Carol", "last_name": "Jones",
     "emails": ["carol@other.org", "carol@hpc.site"]},
    {"uid": 1002, "username": "erin", "emails": ["erin@other.org"]}
]"#;

fn write_directory(home: &TempDir) -> PathBuf {
    let path = home.path().join("users.json");
    fs::write(&path, USERS).unwrap();
    path
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn version_reports_json() {
    let home = tempfile::tempdir().unwrap();
    hpcmail(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\""))
        .stdout(predicate::str::contains("\"snapshot_format\":1"));
}

#[test]
fn unknown_command_fails() {
    let home = tempfile::tempdir().unwrap();
    hpcmail(&home)
        .arg("nonexistent-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn processes_requires_individual() {
    let home = tempfile::tempdir().unwrap();
    hpcmail(&home)
        .args(["recipients", "--processes", "carol"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--individual"));
}

#[cfg(target_os = "linux")]
#[test]
fn snapshot_writes_decodable_frame() {
    let home = tempfile::tempdir().unwrap();
    let output = hpcmail(&home).arg("snapshot").output().unwrap();
    assert!(output.status.success());

    let snap = hm_core::snapshot::decode(&output.stdout).unwrap();
    assert!(!snap.is_empty());
    let me = std::process::id();
    assert!(snap.processes.iter().any(|p| p.pid.0 == me));
}

// ============================================================================
// Recipients
// ============================================================================

#[test]
fn explicit_users_with_unknown_exit_partial() {
    let home = tempfile::tempdir().unwrap();
    let dir = write_directory(&home);
    let output = hpcmail(&home)
        .args(["recipients", "--directory"])
        .arg(&dir)
        .args(["carol", "dave"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(3));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["mode"], "bulk");
    assert_eq!(plan["bcc"], "Carol Jones <carol@hpc.site>");
    assert_eq!(plan["unknown_users"][0]["username"], "dave");
}

#[test]
fn individual_plan_in_markdown() {
    let home = tempfile::tempdir().unwrap();
    let dir = write_directory(&home);
    hpcmail(&home)
        .args(["--format", "md", "recipients", "--individual", "--multiple", "--directory"])
        .arg(&dir)
        .args(["erin", "carol"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("## erin"))
        .stdout(predicate::str::contains(
            "Carol Jones <carol@other.org>, Carol Jones <carol@hpc.site>",
        ));
}

#[test]
fn list_prints_joined_mailboxes() {
    let home = tempfile::tempdir().unwrap();
    let dir = write_directory(&home);
    hpcmail(&home)
        .args(["list", "--directory"])
        .arg(&dir)
        .args(["carol", "erin"])
        .assert()
        .success()
        .stdout("Carol Jones <carol@hpc.site>, erin@other.org\n");
}

#[test]
fn list_with_uid_and_email_keys() {
    let home = tempfile::tempdir().unwrap();
    let dir = write_directory(&home);
    hpcmail(&home)
        .args(["list", "--key-field", "uid", "--directory"])
        .arg(&dir)
        .arg("1002")
        .assert()
        .success()
        .stdout("erin@other.org\n");

    hpcmail(&home)
        .args(["list", "--key-field", "email", "--directory"])
        .arg(&dir)
        .arg("carol@other.org")
        .assert()
        .success()
        .stdout("Carol Jones <carol@hpc.site>\n");
}

#[test]
fn directory_from_config_file() {
    let home = tempfile::tempdir().unwrap();
    let dir = write_directory(&home);
    let config_dir = home.path().join("hpcmail");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("hpcmail.toml"),
        format!(
            "[directory]\npath = {:?}\n\n[addresses]\nall_addresses = true\n",
            dir.display().to_string()
        ),
    )
    .unwrap();

    hpcmail(&home)
        .args(["list", "carol"])
        .assert()
        .success()
        .stdout("Carol Jones <carol@other.org>, Carol Jones <carol@hpc.site>\n");
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn missing_directory_is_config_error() {
    let home = tempfile::tempdir().unwrap();
    hpcmail(&home)
        .args(["list", "carol"])
        .assert()
        .code(11)
        .stderr(predicate::str::contains("no user directory"));
}

#[test]
fn invalid_directory_is_directory_error() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("users.json");
    fs::write(&path, r#"[{"uid": 1, "username": "x", "emails": []}]"#).unwrap();
    hpcmail(&home)
        .args(["list", "--directory"])
        .arg(&path)
        .arg("x")
        .assert()
        .code(12)
        .stderr(predicate::str::contains("\"code\""));
}

#[test]
fn explicit_missing_config_is_config_error() {
    let home = tempfile::tempdir().unwrap();
    hpcmail(&home)
        .args(["--config", "/nonexistent/hpcmail.toml", "list", "carol"])
        .assert()
        .code(11);
}

#[cfg(unix)]
#[test]
fn unreachable_host_is_remote_error() {
    use std::os::unix::fs::PermissionsExt;

    let home = tempfile::tempdir().unwrap();
    let dir = write_directory(&home);
    let ssh = home.path().join("ssh");
    fs::write(&ssh, "#!/bin/sh\necho 'ssh: connect to host node99 port 22: No route to host' >&2\nexit 255\n").unwrap();
    fs::set_permissions(&ssh, fs::Permissions::from_mode(0o755)).unwrap();
    let config = home.path().join("custom.toml");
    fs::write(&config, format!("[remote]\nssh_program = {:?}\n", ssh.display().to_string())).unwrap();

    hpcmail(&home)
        .arg("--config")
        .arg(&config)
        .args(["recipients", "--host", "node99.invalid", "--directory"])
        .arg(&dir)
        .assert()
        .code(14)
        .stderr(predicate::str::contains("No route to host"));
}
