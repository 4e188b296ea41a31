use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn timezone_json() -> &'static str {
    r#"
{
  "USA": [
    { "value": 0, "text": "Eastern (New York)", "ianaTzName": "America/New_York" }
  ],
  "UTC": [
    { "value": 1, "text": "Coordinated Universal Time", "ianaTzName": "UTC" }
  ],
  "Mars": [
    { "value": 2, "text": "Olympus Mons", "ianaTzName": "Mars/Olympus_Mons" }
  ]
}
"#
}

#[test]
fn format_epoch_in_utc_offline() {
    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "0", "--zone", "UTC", "--24h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("00:00:00").and(predicate::str::contains("01/01/1970")));
}

#[test]
fn format_uses_twelve_hour_clock_by_default() {
    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "0", "--zone", "UTC"])
        .assert()
        .success()
        .stdout(predicate::str::contains("12:00:00 AM"));
}

#[test]
fn format_with_timezone_file_and_index() {
    let dir = tempdir().expect("tempdir");
    let zones = dir.path().join("timezones.json");
    fs::write(&zones, timezone_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "1700000000", "--zone", "0", "--timezones"])
        .arg(&zones)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("05:13:20 PM").and(predicate::str::contains("11/14/2023")),
        );
}

#[test]
fn format_unknown_index_prints_placeholder() {
    let dir = tempdir().expect("tempdir");
    let zones = dir.path().join("timezones.json");
    fs::write(&zones, timezone_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "0", "--zone", "42", "--timezones"])
        .arg(&zones)
        .assert()
        .success()
        .stdout(predicate::str::contains("--:--:--").and(predicate::str::contains("--/--/----")));
}

#[test]
fn format_unresolvable_zone_prints_error_text() {
    let dir = tempdir().expect("tempdir");
    let zones = dir.path().join("timezones.json");
    fs::write(&zones, timezone_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "0", "--zone", "2", "--timezones"])
        .arg(&zones)
        .assert()
        .success()
        .stdout(predicate::str::contains("Error"));
}

#[test]
fn malformed_timezone_file_fails_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let zones = dir.path().join("timezones.json");
    fs::write(&zones, "{ not-valid-json ").expect("write invalid json");

    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "0", "--zone", "0", "--timezones"])
        .arg(&zones)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn malformed_config_fails_with_clear_error() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("config.json");
    fs::write(&config, "{ \"version\": ").expect("write invalid json");

    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn unreachable_device_fails_clearly() {
    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["--device", "127.0.0.1:1", "--timeout-ms", "500", "time"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unreachable"));
}

#[test]
fn wifi_reset_requires_confirmation() {
    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["--device", "127.0.0.1:1", "reset-wifi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("without --yes"));
}

#[test]
fn clearing_preferences_requires_confirmation() {
    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["--device", "127.0.0.1:1", "settings", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("without --yes"));
}

#[test]
fn theme_list_works_offline() {
    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.arg("theme")
        .assert()
        .success()
        .stdout(predicate::str::contains("OUTATIME").and(predicate::str::contains("#daa520")));
}

#[test]
fn blank_zone_name_does_not_break_other_zones() {
    let dir = tempdir().expect("tempdir");
    let zones = dir.path().join("timezones.json");
    fs::write(
        &zones,
        r#"{ "UTC": [ { "value": 0, "text": "UTC", "ianaTzName": "UTC" },
                      { "value": 1, "text": "Unnamed", "ianaTzName": "" } ] }"#,
    )
    .expect("write json");

    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "0", "--zone", "0", "--24h", "--timezones"])
        .arg(&zones)
        .assert()
        .success()
        .stdout(predicate::str::contains("00:00:00"));

    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["format", "--unix", "0", "--zone", "1", "--timezones"])
        .arg(&zones)
        .assert()
        .success()
        .stdout(predicate::str::contains("Error"));
}

#[test]
fn https_device_url_is_rejected_up_front() {
    let mut cmd = cargo_bin_cmd!("timecircuits");
    cmd.args(["--device", "https://clock.local", "time"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("plain http"));
}
