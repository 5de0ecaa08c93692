//! CLI Integration Tests
//!
//! These run the `smartguard` binary against a throwaway database. Nothing
//! here touches Bluetooth or the network: history is exercised in demo mode
//! and the cloud endpoint points at a closed local port.

use std::path::Path;
use std::process::{Command, Output};

fn run(db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_smartguard"))
        .arg("--db")
        .arg(db)
        .args(["--no-color", "--quiet", "--endpoint", "http://127.0.0.1:9"])
        .args(args)
        .env_remove("SMARTGUARD_DB")
        .env_remove("SMARTGUARD_TELEMETRY_URL")
        .output()
        .expect("Failed to run smartguard binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// =============================================================================
// Help and Completions
// =============================================================================

#[test]
fn test_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_smartguard"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = stdout(&output);
    for cmd in ["monitor", "history", "report", "nodes", "settings", "login"] {
        assert!(text.contains(cmd), "help should list {cmd}");
    }
}

#[test]
fn test_subcommand_help() {
    for cmd in ["monitor", "history", "report", "nodes", "settings"] {
        let output = Command::new(env!("CARGO_BIN_EXE_smartguard"))
            .args([cmd, "--help"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{cmd} --help should succeed");
        assert!(!stdout(&output).is_empty());
    }
}

#[test]
fn test_completions() {
    let output = Command::new(env!("CARGO_BIN_EXE_smartguard"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("smartguard"));
}

// =============================================================================
// Session and Settings
// =============================================================================

#[test]
fn test_login_logout_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    let output = run(&db, &["login"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Logged in."));

    let output = run(&db, &["login"]);
    assert!(stdout(&output).contains("Already logged in."));

    let output = run(&db, &["logout"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Logged out."));
}

#[test]
fn test_monitor_requires_login() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    let output = run(&db, &["monitor"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Not logged in"));
}

#[test]
fn test_settings_set_and_show() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    assert!(run(&db, &["settings", "set", "warning", "900"]).status.success());
    assert!(run(&db, &["settings", "set", "channel", "2512345"]).status.success());
    assert!(run(&db, &["settings", "set", "read-key", "SECRETKEY1"]).status.success());

    let output = run(&db, &["settings", "show"]);
    let text = stdout(&output);
    assert!(text.contains("warning        900 ppm"));
    assert!(text.contains("channel        2512345"));
    assert!(!text.contains("SECRETKEY1"));

    let output = run(&db, &["settings", "show", "--format", "json"]);
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["warningThreshold"], 900.0);
    assert_eq!(json["channelId"], "2512345");
}

#[test]
fn test_invalid_settings_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    let output = run(&db, &["settings", "set", "danger", "500"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid settings"));

    let output = run(&db, &["settings", "set", "volume", "11"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown setting"));
}

#[test]
fn test_theme_toggle() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    let output = run(&db, &["theme"]);
    assert!(stdout(&output).contains("Theme set to light."));
    let output = run(&db, &["theme"]);
    assert!(stdout(&output).contains("Theme set to dark."));
}

// =============================================================================
// Nodes
// =============================================================================

#[test]
fn test_nodes_add_list_remove() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    let output = run(
        &db,
        &["nodes", "add", "--name", "Boiler", "--location", "Basement", "--device-id", "N7"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let output = run(&db, &["nodes", "add", "--device-id", "N7"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("already registered"));

    let output = run(&db, &["nodes", "list", "--format", "json"]);
    let nodes: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let nodes = nodes.as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[0]["id"], "gateway");
    assert_eq!(nodes[1]["name"], "Boiler");
    let id = nodes[1]["id"].as_str().unwrap().to_string();

    let output = run(&db, &["nodes", "list"]);
    assert!(stdout(&output).contains("Basement"));

    let output = run(&db, &["nodes", "remove", &id]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Device removed from network."));

    let output = run(&db, &["nodes", "remove", &id]);
    assert!(!output.status.success());
}

// =============================================================================
// History and Report
// =============================================================================

#[test]
fn test_demo_history_csv_export() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    assert!(run(&db, &["settings", "set", "demo", "on"]).status.success());

    let out_dir = dir.path().join("exports");
    std::fs::create_dir(&out_dir).unwrap();
    let output = run(
        &db,
        &[
            "history",
            "--range",
            "1H",
            "--format",
            "csv",
            "--output",
            out_dir.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let files: Vec<_> = std::fs::read_dir(&out_dir).unwrap().flatten().collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().to_string_lossy().into_owned();
    assert!(name.starts_with("smartguard_sim_1H_"));
    assert!(name.ends_with(".csv"));

    let content = std::fs::read_to_string(files[0].path()).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("Timestamp,Gas_PPM,Temp_C"));
    assert_eq!(lines.count(), 12);
}

#[test]
fn test_history_without_channel_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");

    let output = run(&db, &["history"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("No 24H history available."));
}

#[test]
fn test_report_in_demo_mode() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.db");
    assert!(run(&db, &["settings", "set", "demo", "on"]).status.success());
    assert!(run(&db, &["settings", "set", "contact", "Site office"]).status.success());

    let report_path = dir.path().join("report.txt");
    let output = run(&db, &["report", "--output", report_path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));

    let report = std::fs::read_to_string(&report_path).unwrap();
    assert!(report.starts_with("SMARTGUARD INCIDENT REPORT"));
    assert!(report.contains("Source: demo"));
    assert!(report.contains("Emergency contact: Site office"));
}
