//! CLI tests for hwpulse_sidecar
use assert_cmd::Command;

#[test]
fn help_prints_usage() {
    let out = Command::cargo_bin("hwpulse_sidecar")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage:"));
    assert!(out.stdout.is_empty());
}

#[test]
fn single_emits_exactly_one_line() {
    let out = Command::cargo_bin("hwpulse_sidecar")
        .unwrap()
        .args(["--single", "--interval", "100"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "{stdout}");
    let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert!(v["timestamp"].as_i64().unwrap() > 0);
    assert!(v["gpu"].is_array());
    assert!(v.get("error").is_none());
}
