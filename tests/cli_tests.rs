//! Integration tests for the localca CLI
//!
//! These tests run the actual localca binary and verify its behavior.
//! Each test uses an isolated CA directory via LOCALCA_ROOT and runs in its
//! own working directory, where issued files land by default.

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Get the path to the localca binary
fn localca_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_localca"))
}

/// Create a test environment with isolated directories
struct TestEnv {
    /// Temporary directory that will be cleaned up on drop
    _temp_dir: TempDir,
    /// The CA directory
    data_dir: PathBuf,
    /// Working directory for the command
    work_dir: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("localca");
        let work_dir = temp_dir.path().join("work");
        std::fs::create_dir_all(&work_dir).expect("Failed to create work directory");

        TestEnv {
            _temp_dir: temp_dir,
            data_dir,
            work_dir,
        }
    }

    /// Run localca command with isolated environment
    fn run(&self, args: &[&str]) -> std::process::Output {
        Command::new(localca_bin())
            .args(args)
            .current_dir(&self.work_dir)
            .env("LOCALCA_ROOT", &self.data_dir)
            .env("HOME", self._temp_dir.path())
            .env_remove("LOCALCA_LOG")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute localca")
    }

    /// Initialize a CA with a small key so tests stay fast
    fn init(&self) {
        let output = self.run(&["init", "--ca-key-bits", "2048"]);
        assert!(
            output.status.success(),
            "init failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn ca_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    fn work_file(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// ============================================================================
// Test: localca init
// ============================================================================

#[test]
fn test_init_creates_ca() {
    let env = TestEnv::new();
    env.init();

    assert!(env.ca_file("ca.crt").exists(), "CA certificate was not created");
    assert!(env.ca_file("ca.key").exists(), "CA key was not created");
    assert!(env.ca_file("ca.serial").exists(), "serial file was not created");
    assert!(env.ca_file("config.toml").exists(), "config was not saved");
    assert_eq!(
        std::fs::read_to_string(env.ca_file("ca.serial")).expect("serial should be readable"),
        "02\n"
    );
}

#[test]
fn test_init_twice_reuses_ca() {
    let env = TestEnv::new();
    env.init();
    let cert_before = std::fs::read(env.ca_file("ca.crt")).expect("CA cert should be readable");

    let output = env.run(&["init", "--ca-key-bits", "2048"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("reusing"));
    assert_eq!(
        std::fs::read(env.ca_file("ca.crt")).expect("CA cert should be readable"),
        cert_before
    );
}

#[test]
fn test_init_partial_state_fails() {
    let env = TestEnv::new();
    env.init();
    std::fs::remove_file(env.ca_file("ca.crt")).expect("CA cert should be removable");

    let output = env.run(&["init", "--ca-key-bits", "2048"]);
    assert!(!output.status.success(), "partial CA must not be repaired");
    assert!(stderr(&output).contains("Inconsistent CA state"));
    assert!(!env.ca_file("ca.crt").exists());
}

#[test]
fn test_init_rejects_invalid_key_bits() {
    let env = TestEnv::new();
    let output = env.run(&["init", "--ca-key-bits", "0"]);

    assert!(!output.status.success());
    assert!(!env.ca_file("ca.key").exists());
}

// ============================================================================
// Test: localca issue
// ============================================================================

#[test]
fn test_issue_localhost_defaults() {
    let env = TestEnv::new();
    env.init();

    let output = env.run(&["issue"]);
    assert!(
        output.status.success(),
        "issue failed: {}",
        stderr(&output)
    );

    let out = stdout(&output);
    assert!(out.contains("SANs: DNS:localhost, IP:127.0.0.1, IP:::1"));
    assert!(out.contains("--tls-keyfile"));
    assert!(env.work_file("localhost.crt").exists());
    assert!(env.work_file("localhost.key").exists());
}

#[test]
fn test_issue_creates_ca_when_missing() {
    let env = TestEnv::new();
    let config_dir = env.data_dir.clone();
    std::fs::create_dir_all(&config_dir).expect("data dir");
    std::fs::write(config_dir.join("config.toml"), "ca_key_bits = 2048\n").expect("config");

    let output = env.run(&["issue", "test.local"]);
    assert!(output.status.success(), "issue failed: {}", stderr(&output));
    assert!(stdout(&output).contains("No CA found"));
    assert!(env.ca_file("ca.crt").exists());
    assert!(env.work_file("test.local.crt").exists());
}

#[test]
fn test_issue_with_sans_and_inspect() {
    let env = TestEnv::new();
    env.init();

    let output = env.run(&["issue", "test.local", "--san", "test.local", "--san", "127.0.0.1"]);
    assert!(output.status.success(), "issue failed: {}", stderr(&output));

    let cert = env.work_file("test.local.crt");
    let cert_arg = cert.to_str().expect("temp path should be UTF-8");
    let output = env.run(&["inspect", cert_arg, "--verify"]);
    assert!(output.status.success(), "inspect failed: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("SANs:       DNS:test.local, IP:127.0.0.1"));
    assert!(out.contains("Serial:     02"));
    assert!(out.contains("Verified:"));
}

#[test]
fn test_issue_custom_file_names() {
    let env = TestEnv::new();
    env.init();

    let output = env.run(&[
        "issue",
        "myserver.local",
        "-k",
        "server.key",
        "-c",
        "server.crt",
        "-d",
        "730",
        "--org",
        "Local",
    ]);
    assert!(output.status.success(), "issue failed: {}", stderr(&output));
    assert!(env.work_file("server.key").exists());
    assert!(env.work_file("server.crt").exists());
    assert!(!env.work_file("myserver.local.crt").exists());
}

#[test]
fn test_issue_out_dir() {
    let env = TestEnv::new();
    env.init();

    let output = env.run(&["issue", "*.app.local", "-o", "certs"]);
    assert!(output.status.success(), "issue failed: {}", stderr(&output));
    assert!(env.work_file("certs/_wildcard_.app.local.crt").exists());
    assert!(env.work_file("certs/_wildcard_.app.local.key").exists());
}

#[cfg(unix)]
#[test]
fn test_issue_file_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    env.init();
    let output = env.run(&["issue", "test.local"]);
    assert!(output.status.success(), "issue failed: {}", stderr(&output));

    let mode = |p: &Path| {
        std::fs::metadata(p)
            .expect("metadata should be readable")
            .permissions()
            .mode()
            & 0o777
    };
    assert_eq!(mode(&env.work_file("test.local.key")), 0o600);
    assert_eq!(mode(&env.work_file("test.local.crt")), 0o644);
    assert_eq!(mode(&env.ca_file("ca.key")), 0o600);
}

#[test]
fn test_issue_refuses_existing_files() {
    let env = TestEnv::new();
    env.init();

    assert!(env.run(&["issue", "test.local"]).status.success());
    let cert_before =
        std::fs::read(env.work_file("test.local.crt")).expect("cert should be readable");

    let output = env.run(&["issue", "test.local"]);
    assert!(!output.status.success(), "existing files must not be replaced");
    assert!(stderr(&output).contains("already exists"));
    assert_eq!(
        std::fs::read(env.work_file("test.local.crt")).expect("cert should be readable"),
        cert_before
    );
    // No serial consumed by the refused request
    assert_eq!(
        std::fs::read_to_string(env.ca_file("ca.serial")).expect("serial"),
        "03\n"
    );

    let output = env.run(&["issue", "test.local", "--overwrite"]);
    assert!(output.status.success(), "overwrite failed: {}", stderr(&output));
    assert_ne!(
        std::fs::read(env.work_file("test.local.crt")).expect("cert should be readable"),
        cert_before
    );
}

#[test]
fn test_issue_rejects_invalid_input() {
    let env = TestEnv::new();
    env.init();

    for args in [
        vec!["issue", "test.local", "--days", "0"],
        vec!["issue", "test.local", "--size", "1024"],
        vec!["issue", "../escape.local"],
        vec!["issue", "ca"],
    ] {
        let output = env.run(&args);
        assert!(!output.status.success(), "{:?} should fail", args);
        assert!(stderr(&output).starts_with("Error:"));
    }
    assert_eq!(
        std::fs::read_to_string(env.ca_file("ca.serial")).expect("serial"),
        "02\n"
    );
}

#[test]
fn test_issue_verbose_details() {
    let env = TestEnv::new();
    env.init();

    let output = env.run(&["issue", "test.local", "--verbose"]);
    assert!(output.status.success(), "issue failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Serial: 2"));
    assert!(out.contains("Not After:"));
    assert!(out.contains("Issuer:"));
    assert!(out.contains("CN=localca Development CA"));
}

#[test]
fn test_issue_quiet() {
    let env = TestEnv::new();
    env.init();

    let output = env.run(&["issue", "test.local", "--quiet"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(!out.contains("Generating certificate"));
    assert!(out.contains("Certificate:"));
}

// ============================================================================
// Test: status, path, trust-help, completions
// ============================================================================

#[test]
fn test_status_not_initialized() {
    let env = TestEnv::new();
    let output = env.run(&["status"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("not initialized"));
}

#[test]
fn test_status_shows_next_serial() {
    let env = TestEnv::new();
    env.init();
    assert!(env.run(&["issue", "a.local"]).status.success());
    assert!(env.run(&["issue", "b.local"]).status.success());

    let output = env.run(&["status"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("initialized"));
    assert!(out.contains("Next serial: 4"));
}

#[test]
fn test_path_uses_root_env() {
    let env = TestEnv::new();
    let output = env.run(&["path"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(&env.data_dir.join("ca.crt").display().to_string()));
}

#[test]
fn test_dir_flag_overrides_env() {
    let env = TestEnv::new();
    let output = env.run(&["--dir", "custom-ca", "init", "--ca-key-bits", "2048"]);

    assert!(output.status.success(), "init failed: {}", stderr(&output));
    assert!(env.work_file("custom-ca/ca.crt").exists());
    assert!(!env.ca_file("ca.crt").exists());
}

#[test]
fn test_trust_help_all() {
    let env = TestEnv::new();
    env.init();

    let output = env.run(&["trust-help", "--all"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("update-ca-certificates"));
    assert!(out.contains("add-trusted-cert"));
    assert!(out.contains("certutil -addstore"));
    assert!(out.contains("NODE_EXTRA_CA_CERTS"));
}

#[test]
fn test_acme_missing_client() {
    let env = TestEnv::new();
    let output = env.run(&[
        "acme",
        "dev.example.com",
        "--email",
        "ops@example.com",
        "--program",
        "localca-no-such-acme-client",
    ]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"));
    assert!(!env.work_file("cert.crt").exists());
}

#[test]
fn test_completions() {
    let env = TestEnv::new();
    let output = env.run(&["completions", "bash"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("localca"));
}

#[test]
fn test_help() {
    let env = TestEnv::new();
    let output = env.run(&["--help"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("issue"));
    assert!(out.contains("trust-help"));
}
