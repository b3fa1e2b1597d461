//! CLI Integration Tests
//!
//! These tests verify the CLI binary output formats and command behaviors.
//! Some tests require actual hardware and are marked with #[ignore].
//!
//! Run mock tests:
//! ```text
//! cargo test --package mijia-cli --test cli_integration
//! ```
//!
//! Run hardware tests:
//! ```text
//! MIJIA_DEVICE="LYWSD02" cargo test --package mijia-cli --test cli_integration -- --ignored --nocapture
//! ```

use std::process::Command;

/// Run the mijia binary and return output
fn run_mijia(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_mijia"))
        .args(args)
        .env_remove("MIJIA_DEVICE")
        .output()
        .expect("Failed to run mijia binary")
}

// =============================================================================
// Help and Version Tests (no hardware required)
// =============================================================================

#[test]
fn test_help_command() {
    let output = run_mijia(&["--help"]);

    assert!(output.status.success(), "Help should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Mijia"), "Help should mention Mijia");
    for command in ["scan", "caps", "read", "set", "history", "config"] {
        assert!(stdout.contains(command), "Help should list {command} command");
    }
}

#[test]
fn test_version_command() {
    let output = run_mijia(&["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mijia"));
}

#[test]
fn test_read_help_mentions_env_var() {
    let output = run_mijia(&["read", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MIJIA_DEVICE"));
    assert!(stdout.contains("--notification-timeout"));
}

// =============================================================================
// Capability Tests (no hardware required)
// =============================================================================

#[test]
fn test_caps_json_lywsd02() {
    let output = run_mijia(&["caps", "--model", "lywsd02", "--format", "json"]);
    assert!(output.status.success(), "caps should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("caps should emit JSON");
    let caps = &json[0]["capabilities"];

    let reads: Vec<&str> = caps["read"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["operation"].as_str().unwrap())
        .collect();
    assert_eq!(reads, ["getTime", "getTempAndHum", "getBattery", "getTempUnit"]);

    let writes: Vec<&str> = caps["write"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["operation"].as_str().unwrap())
        .collect();
    assert_eq!(writes, ["setTime", "setTempUnit"]);
}

#[test]
fn test_caps_text_lywsdcgq() {
    let output = run_mijia(&["caps", "--model", "lywsdcgq"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MJ_HT_V1"));
    assert!(stdout.contains("getTempAndHum"));
    assert!(stdout.contains("getBattery"));
    assert!(!stdout.contains("setTime"));
}

#[test]
fn test_caps_all_models() {
    let output = run_mijia(&["caps", "--format", "json", "--compact"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().count(), 1, "compact JSON is a single line");
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[test]
fn test_caps_invalid_model() {
    let output = run_mijia(&["caps", "--model", "lywsd03mmc"]);
    assert!(!output.status.success(), "unknown model should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown model"));
}

#[test]
fn test_caps_output_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caps.json");
    let output = run_mijia(&[
        "caps",
        "-m",
        "lywsd02",
        "-f",
        "json",
        "-o",
        path.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("setTempUnit"));
}

// =============================================================================
// Hardware Tests
// =============================================================================

#[test]
#[ignore = "requires BLE hardware"]
fn test_read_all_operations() {
    let device = std::env::var("MIJIA_DEVICE").unwrap_or_default();
    let mut args = vec!["read", "--format", "json"];
    if !device.is_empty() {
        args.extend(["--device", device.as_str()]);
    }
    let output = run_mijia(&args);
    assert!(
        output.status.success(),
        "read failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert!(json["readings"]["temp"].is_number());
    assert!(json["readings"]["batt"].is_number());
}
