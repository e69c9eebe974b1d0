use assert_cmd::Command;
use kegmeter_protocol::{FrameDecoder, Message};
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

// Small windows and a fast loop so bounded runs finish quickly.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[meters]
count = 2
status_period_ticks = 4

[window]
capacity = 5

[dwell]
min_ticks = 200

[sampling]
rate_hz = 200

[timeouts]
transport_poll_ms = 1
sensor_ms = 50
"#;
    let path = dir.path().join("kegmeter.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], "Usage:")]
#[case(&["check"], "config OK")]
#[case(&["check"], "meters: 2")]
fn stdout_table_cases(#[case] args: &[&str], #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("kegmeter").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(needle));
}

#[test]
fn check_rejects_invalid_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[meters]\ncount = 0\n").unwrap();

    Command::cargo_bin("kegmeter")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("meters.count"));
}

#[test]
fn check_rejects_malformed_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "meters = [").unwrap();

    Command::cargo_bin("kegmeter")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse config"));
}

/// Run the wire decoder over everything the binary wrote to stdout; log
/// lines between the frames are skipped as inter-frame garbage.
fn decode_stdout(bytes: &[u8]) -> Vec<Message> {
    let mut dec = FrameDecoder::new();
    dec.extend(bytes);
    let mut out = Vec::new();
    while let Some(msg) = dec.next_message() {
        out.push(msg);
    }
    out
}

#[test]
fn bounded_run_emits_status_frames() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("kegmeter")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--ticks", "30"])
        .output()
        .unwrap();
    assert!(out.status.success());

    // Periodic status frames for both simulated meters, with a percent field.
    let statuses: Vec<usize> = decode_stdout(&out.stdout)
        .into_iter()
        .filter_map(|msg| match msg {
            Message::Status { meter, fields } => {
                assert!(fields.percent.is_some(), "status without percent");
                Some(meter)
            }
            _ => None,
        })
        .collect();
    assert!(statuses.contains(&0), "no status for meter 0: {statuses:?}");
    assert!(statuses.contains(&1), "no status for meter 1: {statuses:?}");
}

#[test]
fn host_percent_command_shows_up_in_status() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("kegmeter")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--ticks", "40"])
        .write_stdin("[00 P 0.75]")
        .output()
        .unwrap();
    assert!(out.status.success());

    let overridden = decode_stdout(&out.stdout).into_iter().any(|msg| {
        matches!(
            msg,
            Message::Status { meter: 0, fields } if fields.percent == Some(0.75)
        )
    });
    assert!(overridden, "percent override never reported back");
}

#[test]
fn run_persists_calibration_store_when_configured() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let store = dir.path().join("cal.toml");

    Command::cargo_bin("kegmeter")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--ticks", "30", "--calibration"])
        .arg(&store)
        .assert()
        .success();

    // The periodic persist writes the store even before any calibration.
    let text = fs::read_to_string(&store).unwrap();
    assert!(text.contains("[meter.0]"), "store content: {text}");
}
