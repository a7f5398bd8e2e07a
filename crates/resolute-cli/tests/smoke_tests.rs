//! Smoke tests for the resolute CLI
//!
//! These tests exercise the commands that need no browser, plus the
//! skip path of `login` when credentials are absent.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "MODE",
    "BASE_URL",
    "GOOGLE_EMAIL",
    "GOOGLE_PASSWORD",
    "LIVESHARE_EMAIL",
    "LIVESHARE_PASSWORD",
    "MAILOSAUR_API_KEY",
    "MAILOSAUR_SERVER_ID",
    "RESOLUTE_CONFIG",
    "RUST_LOG",
];

/// Get a command for the resolute binary with a clean environment
fn resolute() -> Command {
    let mut cmd = Command::cargo_bin("resolute").expect("resolute binary should exist");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.arg("--color").arg("never");
    cmd
}

fn write_session(dir: &TempDir, key: &str) {
    fs::write(
        dir.path().join(format!("{key}.json")),
        r#"{"cookies":[{"name":"sid","value":"abc","domain":"app.test"}],"origins":[]}"#,
    )
    .unwrap();
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    resolute()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    resolute()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("session"))
        .stdout(predicate::str::contains("probe"));
}

#[test]
fn test_no_args_shows_help() {
    resolute().assert().failure(); // Requires a subcommand
}

// ============================================================================
// Subcommand Help Tests
// ============================================================================

#[test]
fn test_session_subcommand_help() {
    resolute()
        .args(["session", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("clear"));
}

#[test]
fn test_probe_subcommand_help() {
    resolute()
        .args(["probe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Candidate locators"));
}

#[test]
fn test_probe_without_candidates_fails() {
    resolute()
        .args(["probe", "/events"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CANDIDATES"));
}

// ============================================================================
// Session Command Tests
// ============================================================================

#[test]
fn test_session_status_empty_dir() {
    let dir = TempDir::new().unwrap();
    resolute()
        .args(["session", "status", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("user-auth: no session stored"));
}

#[test]
fn test_session_status_json_for_worker() {
    let dir = TempDir::new().unwrap();
    write_session(&dir, "user-auth-w1");
    resolute()
        .args(["session", "status", "--worker", "1", "--json", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"key\": \"user-auth-w1\""))
        .stdout(predicate::str::contains("\"exists\": true"))
        .stdout(predicate::str::contains("\"expired\": false"))
        .stdout(predicate::str::contains("\"cookies\": 1"));
}

#[test]
fn test_session_status_all_lists_keys() {
    let dir = TempDir::new().unwrap();
    write_session(&dir, "user-auth-w0");
    write_session(&dir, "user-auth-w1");
    resolute()
        .args(["session", "status", "--all", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("user-auth-w0: fresh"))
        .stdout(predicate::str::contains("user-auth-w1: fresh"));
}

#[test]
fn test_session_clear_all() {
    let dir = TempDir::new().unwrap();
    write_session(&dir, "user-auth");
    write_session(&dir, "admin");
    resolute()
        .args(["session", "clear", "--all", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("removed admin, user-auth"));
    assert!(!dir.path().join("user-auth.json").exists());
    assert!(!dir.path().join("admin.json").exists());
}

#[test]
fn test_session_clear_missing_key() {
    let dir = TempDir::new().unwrap();
    resolute()
        .args(["session", "clear", "--key", "ghost", "--dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to clear"));
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_json_from_env() {
    resolute()
        .env("MODE", "staging")
        .env("BASE_URL", "https://staging.app.test/")
        .env("GOOGLE_EMAIL", "qa@example.test")
        .env("GOOGLE_PASSWORD", "hunter2")
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"profile\": \"staging\""))
        .stdout(predicate::str::contains("https://staging.app.test\""))
        .stdout(predicate::str::contains("\"google\": true"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_config_from_yaml_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("resolute.yaml");
    fs::write(&file, "profile: staging\nbase_url: https://yaml.app.test\n").unwrap();
    resolute()
        .arg("--config")
        .arg(&file)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("profile: staging"))
        .stdout(predicate::str::contains("yaml.app.test"));
}

#[test]
fn test_config_missing_base_url_skips() {
    resolute()
        .env("MODE", "production")
        .arg("config")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("SKIP"))
        .stdout(predicate::str::contains("BASE_URL"));
}

#[test]
fn test_config_unknown_profile_fails() {
    resolute()
        .env("MODE", "qa-cluster")
        .arg("config")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown profile"));
}

// ============================================================================
// Login Command Tests
// ============================================================================

#[cfg(feature = "browser")]
#[test]
fn test_login_without_credentials_skips() {
    resolute()
        .arg("login")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("GOOGLE_EMAIL"));
}

#[cfg(feature = "browser")]
#[test]
fn test_email_login_without_credentials_skips() {
    resolute()
        .args(["login", "--method", "email"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("LIVESHARE_EMAIL"));
}

#[cfg(not(feature = "browser"))]
#[test]
fn test_login_requires_browser_feature() {
    resolute()
        .arg("login")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'browser' feature"));
}
