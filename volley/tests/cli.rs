use std::process::{Command, Output};

use mock_target::MockTarget;

fn volley(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_volley"))
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn json_result_against_live_target() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let target = rt.block_on(MockTarget::spawn()).unwrap();
    let url = target.url("/");

    let out = volley(&["-c", "4", "-n", "40", "-o", "json", "-p", "r", &url]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let result: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(result["requests"], 40);
    assert_eq!(result["status"]["2xx"], 40);
    assert_eq!(result["stop_cause"], "completed");
    assert_eq!(target.hits(), 40);
}

#[test]
fn plain_text_with_latencies() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let target = rt.block_on(MockTarget::spawn()).unwrap();
    let url = target.url("/status/404");

    let out = volley(&["--http1", "-c", "2", "-n", "10", "-l", "-p", "i,r", &url]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.starts_with("Volleying "), "{stdout}");
    assert!(stdout.contains("4xx - 10"), "{stdout}");
    assert!(stdout.contains("Latency Distribution"), "{stdout}");
}

#[test]
fn quiet_run_prints_nothing() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let target = rt.block_on(MockTarget::spawn()).unwrap();

    let out = volley(&["-q", "-c", "1", "-n", "3", &target.url("/")]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());
    assert_eq!(target.hits(), 3);
}

#[test]
fn usage_errors_exit_nonzero() {
    assert!(!volley(&[]).status.success());
    assert!(!volley(&["--print=", "http://localhost"]).status.success());
    let out = volley(&["-c", "0", "-n", "1", "http://localhost"]);
    assert!(!out.status.success());
    assert!(
        String::from_utf8_lossy(&out.stderr).contains("workers must be at least 1"),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
}
