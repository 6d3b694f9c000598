#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TEST_PASSWORD: &str = "test-password-123";
const SIGNING_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Command with fast key derivation, an isolated config directory and the
/// test password in the environment.
fn recordvault(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("recordvault").unwrap();
    cmd.env("RECORDVAULT_PASSWORD", TEST_PASSWORD)
        .env("RECORDVAULT_FAST_KDF", "true")
        .env("RECORDVAULT_CONFIG_DIR", config_dir)
        .env_remove("RECORDVAULT_NEW_PASSWORD")
        .env_remove("RECORDVAULT_SESSION_KEY")
        .env_remove("RUST_LOG");
    cmd
}

struct Principal {
    temp: TempDir,
    dir: PathBuf,
}

impl Principal {
    fn cmd(&self) -> Command {
        recordvault(self.temp.path())
    }
}

fn create_principal() -> Principal {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let dir = temp.path().join("alice");

    recordvault(temp.path())
        .arg("signup")
        .arg(&dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created principal"));

    Principal { temp, dir }
}

fn write_record(principal: &Principal, name: &str, content: &str) {
    principal
        .cmd()
        .arg("write")
        .arg(&principal.dir)
        .arg(name)
        .write_stdin(content)
        .assert()
        .success();
}

// ==================== signup / write / cat ====================

#[test]
fn test_write_then_cat_roundtrip() {
    let principal = create_principal();
    write_record(&principal, "notes/today", "dear diary");

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("notes/today")
        .assert()
        .success()
        .stdout("dear diary");
}

#[test]
fn test_write_from_input_file() {
    let principal = create_principal();
    let input = principal.temp.path().join("input.txt");
    fs::write(&input, "from a file").unwrap();

    principal
        .cmd()
        .args(["write", "-i"])
        .arg(&input)
        .arg(&principal.dir)
        .arg("imported")
        .assert()
        .success();

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("imported")
        .assert()
        .success()
        .stdout("from a file");
}

#[test]
fn test_password_from_stdin_then_record_data() {
    let principal = create_principal();

    principal
        .cmd()
        .env_remove("RECORDVAULT_PASSWORD")
        .arg("--password-stdin")
        .arg("write")
        .arg(&principal.dir)
        .arg("piped")
        .write_stdin(format!("{TEST_PASSWORD}\nrecord body"))
        .assert()
        .success();

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("piped")
        .assert()
        .success()
        .stdout("record body");
}

#[test]
fn test_traversal_names_stay_in_data_dir() {
    let principal = create_principal();
    write_record(&principal, "../../escape", "contained");

    assert!(!principal.temp.path().join("escape").exists());
    assert!(principal.dir.join("data").join("escape").exists());

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("escape")
        .assert()
        .success()
        .stdout("contained");
}

#[test]
fn test_signup_twice_fails() {
    let principal = create_principal();

    principal
        .cmd()
        .arg("signup")
        .arg(&principal.dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to create principal"));
}

// ==================== failure exit codes ====================

#[test]
fn test_wrong_password_exit_code() {
    let principal = create_principal();
    write_record(&principal, "note", "secret");

    principal
        .cmd()
        .env("RECORDVAULT_PASSWORD", "wrong-password")
        .arg("cat")
        .arg(&principal.dir)
        .arg("note")
        .assert()
        .code(3)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_tampered_record_prints_only_unreadable() {
    let principal = create_principal();
    write_record(&principal, "note", "some secret content");

    let path = principal.dir.join("data").join("note");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&path, bytes).unwrap();

    principal
        .cmd()
        .arg("-q")
        .arg("cat")
        .arg(&principal.dir)
        .arg("note")
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty());

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("note")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Error: record unreadable"))
        .stderr(predicate::str::contains("padding").not());
}

#[test]
fn test_missing_record_exit_code() {
    let principal = create_principal();

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("absent")
        .assert()
        .code(5);
}

#[test]
fn test_unknown_principal_exit_code() {
    let temp = TempDir::new().unwrap();

    recordvault(temp.path())
        .arg("cat")
        .arg(temp.path().join("nobody"))
        .arg("note")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("signup"));
}

#[test]
fn test_corrupted_private_state_exit_code() {
    let principal = create_principal();
    fs::write(principal.dir.join("secrets").join("passwordhash"), "not hex").unwrap();

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("note")
        .assert()
        .code(4);
}

#[test]
fn test_usage_error_exit_code() {
    let temp = TempDir::new().unwrap();
    recordvault(temp.path()).arg("cat").assert().code(2);
}

// ==================== passwd ====================

#[test]
fn test_passwd_changes_password() {
    let principal = create_principal();
    write_record(&principal, "note", "survives");

    principal
        .cmd()
        .arg("passwd")
        .arg(&principal.dir)
        .env("RECORDVAULT_NEW_PASSWORD", "brand-new-password")
        .assert()
        .success()
        .stdout(predicate::str::contains("Password changed"));

    principal
        .cmd()
        .arg("cat")
        .arg(&principal.dir)
        .arg("note")
        .assert()
        .code(3);

    principal
        .cmd()
        .env("RECORDVAULT_PASSWORD", "brand-new-password")
        .arg("cat")
        .arg(&principal.dir)
        .arg("note")
        .assert()
        .success()
        .stdout("survives");
}

// ==================== config ====================

#[test]
fn test_explicit_config_file() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("custom.toml");
    fs::write(&config, "[session]\ncookie_name = \"rv\"\nmax_age_secs = 60\n").unwrap();

    recordvault(temp.path())
        .arg("--config")
        .arg(&config)
        .args(["session", "issue", "--key-hex", SIGNING_KEY_HEX, "--id", "1", "--email", "a@b.c", "--cookie"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("rv="))
        .stdout(predicate::str::contains("; Max-Age=60; HttpOnly"));
}

#[test]
fn test_malformed_config_file_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("config.toml"), "[kdf\n").unwrap();

    recordvault(temp.path())
        .args(["generate-keys", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

// ==================== session ====================

fn issue_token(config_dir: &Path, extra: &[&str]) -> String {
    let output = recordvault(config_dir)
        .args(["session", "issue", "--key-hex", SIGNING_KEY_HEX, "--id", "7", "--email", "alice@example.com"])
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

#[test]
fn test_session_issue_and_verify() {
    let temp = TempDir::new().unwrap();
    let token = issue_token(temp.path(), &[]);
    assert_eq!(token.split('.').count(), 3);

    let output = recordvault(temp.path())
        .args(["session", "verify", "--key-hex", SIGNING_KEY_HEX])
        .write_stdin(token)
        .output()
        .unwrap();
    assert!(output.status.success());

    let claims: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(claims["id"], 7);
    assert_eq!(claims["email"], "alice@example.com");
}

#[test]
fn test_session_verify_with_wrong_key() {
    let temp = TempDir::new().unwrap();
    let token = issue_token(temp.path(), &[]);

    recordvault(temp.path())
        .args(["session", "verify", "--key-hex", "ff"])
        .write_stdin(token)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid token signature"));
}

#[test]
fn test_session_verify_malformed_token() {
    let temp = TempDir::new().unwrap();

    recordvault(temp.path())
        .args(["session", "verify", "--key-hex", SIGNING_KEY_HEX])
        .write_stdin("not-a-token")
        .assert()
        .code(4);
}

#[test]
fn test_session_verify_cookie_header() {
    let temp = TempDir::new().unwrap();
    let token = issue_token(temp.path(), &[]);

    recordvault(temp.path())
        .args(["session", "verify", "--cookie", "--key-hex", SIGNING_KEY_HEX])
        .write_stdin(format!("theme=dark; session={token}"))
        .assert()
        .success()
        .stdout(predicate::str::contains("alice@example.com"));
}

#[test]
fn test_session_inspect_does_not_need_key() {
    let temp = TempDir::new().unwrap();
    let token = issue_token(temp.path(), &[]);

    recordvault(temp.path())
        .args(["session", "inspect"])
        .write_stdin(token)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"email\": \"alice@example.com\""));
}

#[test]
fn test_sealed_credential_roundtrip() {
    let principal = create_principal();
    let dir = principal.dir.to_str().unwrap();
    let token = issue_token(
        principal.temp.path(),
        &["--credential", "second factor", "--seal-with", dir],
    );

    principal
        .cmd()
        .args(["session", "inspect"])
        .write_stdin(token.clone())
        .assert()
        .success()
        .stdout(predicate::str::contains("sealed_credential"))
        .stdout(predicate::str::contains("second factor").not());

    principal
        .cmd()
        .args(["session", "verify", "--key-hex", SIGNING_KEY_HEX, "--open-with", dir])
        .write_stdin(token)
        .assert()
        .success()
        .stdout(predicate::str::contains("second factor"));
}

#[test]
fn test_credential_sealed_for_another_principal_is_unreadable() {
    let principal = create_principal();
    let bob = principal.temp.path().join("bob");
    recordvault(principal.temp.path())
        .arg("signup")
        .arg(&bob)
        .assert()
        .success();

    let token = issue_token(
        principal.temp.path(),
        &["--credential", "second factor", "--seal-with", bob.to_str().unwrap()],
    );

    principal
        .cmd()
        .args(["session", "verify", "--key-hex", SIGNING_KEY_HEX, "--open-with"])
        .arg(&principal.dir)
        .write_stdin(token)
        .assert()
        .code(4)
        .stdout(predicate::str::contains("second factor").not())
        .stderr(predicate::str::contains("Error: record unreadable"))
        .stderr(predicate::str::contains("MAC").not())
        .stderr(predicate::str::contains("Authentication failed").not());
}

#[test]
fn test_credential_requires_principal() {
    let temp = TempDir::new().unwrap();

    recordvault(temp.path())
        .args(["session", "issue", "--key-hex", SIGNING_KEY_HEX, "--id", "1", "--email", "a@b.c"])
        .args(["--credential", "orphan"])
        .assert()
        .code(2);
}

// ==================== generate-keys ====================

#[test]
fn test_generate_keys() {
    let temp = TempDir::new().unwrap();
    let output = recordvault(temp.path()).args(["generate-keys", "3"]).output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let keys: Vec<&str> = stdout.lines().collect();
    assert_eq!(keys.len(), 3);
    for key in &keys {
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
    assert_ne!(keys[0], keys[1]);
}

#[test]
fn test_generate_keys_rejects_zero() {
    let temp = TempDir::new().unwrap();
    recordvault(temp.path()).args(["generate-keys", "0"]).assert().code(2);
}
