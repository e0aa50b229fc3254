//! CLI arg parsing tests for the hwpulse binary
use assert_cmd::Command;

#[test]
fn help_prints_usage_and_exits() {
    let out = Command::cargo_bin("hwpulse")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(out.status.success());
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("Usage:"), "{err}");
    assert!(err.contains("--interval"));
}

#[test]
fn unknown_flag_is_reported() {
    let out = Command::cargo_bin("hwpulse")
        .unwrap()
        .arg("--definitely-not-a-flag")
        .output()
        .unwrap();
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.contains("Unexpected argument"), "{err}");
}

#[test]
fn port_short_and_long_start_the_server() {
    // Accepted flags mean the process starts; kill it once it had time to bind.
    let exe = env!("CARGO_BIN_EXE_hwpulse");
    for args in [["--port", "39555"], ["-p", "39556"]] {
        let mut child = std::process::Command::new(exe)
            .args(args)
            .arg("--no-sidecar")
            .spawn()
            .expect("spawn agent");
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(child.try_wait().unwrap().is_none(), "agent exited early with {args:?}");
        let _ = child.kill();
        let _ = child.wait();
    }
}
