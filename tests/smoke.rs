//! Smoke tests -- verify the binary runs and the command tree is wired.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("vmware-aiops").unwrap()
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("vCenter/ESXi"));
}

#[test]
fn test_cli_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vmware-aiops"));
}

#[test]
fn test_subcommands_exist() {
    for args in [
        &["daemon", "start", "--help"][..],
        &["daemon", "status", "--help"],
        &["scan", "now", "--help"],
        &["health", "alarms", "--help"],
        &["health", "events", "--help"],
        &["inventory", "vms", "--help"],
        &["vm", "power-off", "--help"],
        &["vm", "snapshot-revert", "--help"],
        &["vm", "migrate", "--help"],
    ] {
        cli().args(args).assert().success();
    }
}

#[test]
fn test_power_off_help_mentions_force() {
    cli()
        .args(["vm", "power-off", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_missing_config_fails_with_path() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("nope.yaml");
    cli()
        .args(["inventory", "vms", "--config"])
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.yaml"));
}

#[test]
fn test_invalid_severity_is_rejected() {
    cli()
        .args(["health", "events", "--severity", "fatal"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown severity"));
}

#[test]
fn test_disabled_scanner_exits_cleanly() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = dir.path().join("config.yaml");
    std::fs::write(&config, "scanner:\n  enabled: false\n").unwrap();
    cli()
        .args(["daemon", "start", "--config"])
        .arg(&config)
        .assert()
        .success();
}
