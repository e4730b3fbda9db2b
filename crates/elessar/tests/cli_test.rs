//! Integration tests for the `elessar` CLI binary.
//!
//! Offline commands only: nothing here needs a Bluetooth adapter or a
//! bridge on the network.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

const IBEACON: &str = "ibeacon:e2c56db5-dffb-48d2-b060-d0f5a71096e0:1:2";
const EDDYSTONE: &str = "eddystone:EDD1EBEAC04E5DEFA017:0BDB87539B67";

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with config and state isolated under `dir`.
fn elessar_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("elessar");
    cmd.env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("XDG_DATA_HOME", dir.join("data"))
        .env_remove("ELESSAR_STATE_FILE")
        .env_remove("ELESSAR_SCAN_PERIOD")
        .env_remove("ELESSAR_APP_NAME")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--state-file")
        .arg(dir.join("state.json"));
    cmd
}

fn read_state(dir: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(dir.join("state.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = TempDir::new().unwrap();
    let output = cargo_bin_cmd!("elessar")
        .env("HOME", dir.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("beacon")
                .and(predicate::str::contains("bridge"))
                .and(predicate::str::contains("scan")),
        );
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("elessar"));
}

#[test]
fn test_invalid_subcommand() {
    let dir = TempDir::new().unwrap();
    let output = elessar_cmd(dir.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("foobar"));
}

// ── Beacons ─────────────────────────────────────────────────────────

#[test]
fn test_beacons_empty_list() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["-o", "plain", "beacons"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_beacons_set_and_list() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["-q", "beacons", IBEACON, EDDYSTONE])
        .assert()
        .success();

    let state = read_state(dir.path());
    let beacons = state["beacons"].as_array().unwrap();
    assert_eq!(beacons.len(), 2);
    assert_eq!(beacons[0]["_vendor"], "ibeacon");
    assert_eq!(beacons[0]["major"], "1");
    assert_eq!(beacons[1]["namespace"], "edd1ebeac04e5defa017");

    elessar_cmd(dir.path())
        .args(["-o", "plain", "beacons"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains(IBEACON)
                .and(predicate::str::contains("eddystone:edd1ebeac04e5defa017:0bdb87539b67")),
        );
}

#[test]
fn test_beacons_json_output() {
    let dir = TempDir::new().unwrap();
    let output = elessar_cmd(dir.path())
        .args(["-o", "json", "beacons", IBEACON])
        .output()
        .unwrap();
    assert!(output.status.success());
    let views: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(views[0]["id"], IBEACON);
    assert_eq!(views[0]["vendor"], "ibeacon");
    assert_eq!(views[0]["tracked"], true);
}

#[test]
fn test_beacons_clear() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["-q", "beacons", IBEACON])
        .assert()
        .success();
    elessar_cmd(dir.path())
        .args(["-q", "beacons", "--clear"])
        .assert()
        .success();
    assert_eq!(read_state(dir.path())["beacons"], serde_json::json!([]));
}

#[test]
fn test_beacons_rejects_bad_ids() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["beacons", "altbeacon:1234"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("altbeacon"));

    elessar_cmd(dir.path())
        .args(["beacons", "ibeacon:not-a-uuid:1:2"])
        .assert()
        .code(2);

    // Nothing was written.
    assert!(!dir.path().join("state.json").exists());
}

// ── Bridges ─────────────────────────────────────────────────────────

#[test]
fn test_bridge_add_groups_remove() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["-q", "bridge", "add", "001788FFFE123456", "--groups", "2,1,2"])
        .assert()
        .success();

    let state = read_state(dir.path());
    assert_eq!(state["bridges"][0]["id"], "001788FFFE123456");
    assert_eq!(state["bridges"][0]["group_ids"], serde_json::json!(["1", "2"]));

    elessar_cmd(dir.path())
        .args(["-q", "bridge", "groups", "001788FFFE123456", "5"])
        .assert()
        .success();
    assert_eq!(
        read_state(dir.path())["bridges"][0]["group_ids"],
        serde_json::json!(["5"])
    );

    elessar_cmd(dir.path())
        .args(["-o", "plain", "bridge", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("001788FFFE123456"));

    elessar_cmd(dir.path())
        .args(["-q", "bridge", "rm", "001788FFFE123456"])
        .assert()
        .success();
    assert_eq!(read_state(dir.path())["bridges"], serde_json::json!([]));
}

#[test]
fn test_bridge_remove_unknown() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["bridge", "remove", "NOPE"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("NOPE"));
}

#[test]
fn test_bridge_groups_requires_ids() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["bridge", "groups", "001788FFFE123456"])
        .assert()
        .code(2);
}

// ── Settings ────────────────────────────────────────────────────────

#[test]
fn test_settings_update() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["settings", "--scan-period", "7", "--force-lights-state", "true"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("scan_period = 7")
                .and(predicate::str::contains("force_lights_state = true")),
        );

    let state = read_state(dir.path());
    assert_eq!(state["scan_period"], 7);
    assert_eq!(state["force_lights_state"], true);
}

#[test]
fn test_settings_rejects_zero_period() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["settings", "--scan-period", "0"])
        .assert()
        .code(2);
}

#[test]
fn test_settings_init_writes_file() {
    let dir = TempDir::new().unwrap();
    elessar_cmd(dir.path())
        .args(["-q", "settings", "--init"])
        .assert()
        .success();
    let text = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(text.contains("app_name = \"elessar\""), "{text}");
}

#[test]
fn test_malformed_state_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("state.json"), "{ not json").unwrap();
    elessar_cmd(dir.path())
        .arg("beacons")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("state.json"));
}

#[test]
fn test_bad_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let state = serde_json::json!({
        "scan_period": 3,
        "beacons": [
            {"_vendor": "altbeacon"},
            {"_vendor": "ibeacon", "uuid": "e2c56db5-dffb-48d2-b060-d0f5a71096e0", "major": 1, "minor": 2}
        ],
        "bridges": []
    });
    std::fs::write(dir.path().join("state.json"), state.to_string()).unwrap();
    elessar_cmd(dir.path())
        .args(["-o", "plain", "beacons"])
        .assert()
        .success()
        .stdout(predicate::str::contains(IBEACON));
}
