//! End-to-end tests for the `startup-gate` binary against local TCP listeners.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const UNAVAILABLE: i32 = 69;
const CONFIG: i32 = 78;

/// Gate invocation isolated from the repository's own config directory
fn gate(config_dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_startup-gate"));
    command
        .env("STARTUP_GATE_CONFIG_DIR", config_dir)
        .env("STARTUP_GATE_ENV", "testing")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null());
    command
}

fn run(command: &mut Command) -> Output {
    command.output().expect("failed to run startup-gate")
}

fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_runs_command_once_dependency_accepts() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let output = run(gate(dir.path()).args([
        "--probe", "tcp", "--host", "127.0.0.1", "--port", &port, "--", "sh", "-c",
        "echo gate-open; exit 7",
    ]));

    assert_eq!(output.status.code(), Some(7));
    assert!(String::from_utf8_lossy(&output.stdout).contains("gate-open"));
}

#[test]
fn test_exhausted_budget_never_runs_command() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ran");
    let port = closed_port().to_string();
    let script = format!("touch {}", marker.display());

    let output = run(gate(dir.path()).args([
        "--probe",
        "tcp",
        "--host",
        "127.0.0.1",
        "--port",
        &port,
        "--max-attempts",
        "2",
        "--interval-ms",
        "10",
        "--connect-timeout-ms",
        "500",
        "--",
        "sh",
        "-c",
        &script,
    ]));

    assert_eq!(output.status.code(), Some(UNAVAILABLE));
    assert!(!marker.exists());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unavailable"));
}

#[test]
fn test_every_target_must_be_ready() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ran");
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let open = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    let closed = format!("127.0.0.1:{}", closed_port());
    let script = format!("touch {}", marker.display());

    let output = run(gate(dir.path()).args([
        "--tcp",
        &open,
        "--tcp",
        &closed,
        "--max-attempts",
        "1",
        "--",
        "sh",
        "-c",
        &script,
    ]));

    assert_eq!(output.status.code(), Some(UNAVAILABLE));
    assert!(!marker.exists());
}

#[test]
fn test_tcp_flag_alone_replaces_implicit_postgres() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    // An implicit postgres target would never answer and exhaust this budget
    let output = run(gate(dir.path()).args([
        "--tcp",
        &address,
        "--max-attempts",
        "1",
        "--",
        "sh",
        "-c",
        "exit 0",
    ]));
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_config_file_targets() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::fs::write(
        dir.path().join("startup-gate.yaml"),
        format!("targets:\n  - name: upstream\n    kind: tcp\n    host: 127.0.0.1\n    port: {port}\n"),
    )
    .unwrap();

    let output = run(gate(dir.path()).args(["--", "sh", "-c", "exit 0"]));
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_empty_program_is_rejected() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let output = run(gate(dir.path()).args(["--tcp", &address, "--", ""]));
    assert_eq!(output.status.code(), Some(CONFIG));
}

#[test]
fn test_missing_command_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let output = run(gate(dir.path()).args(["--tcp", "127.0.0.1:1"]));
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_bad_address_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let output = run(gate(dir.path()).args(["--redis", "redis-without-port", "--", "true"]));
    assert_eq!(output.status.code(), Some(CONFIG));
}

#[test]
fn test_unknown_command_exits_127() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let output = run(gate(dir.path()).args([
        "--tcp",
        &address,
        "--",
        "definitely-not-on-the-path-startup-gate",
    ]));
    assert_eq!(output.status.code(), Some(127));
}

#[cfg(unix)]
#[test]
fn test_exec_handoff_becomes_the_command() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let output = run(gate(dir.path()).args([
        "--exec",
        "--tcp",
        &address,
        "--",
        "sh",
        "-c",
        "echo ok; exit 9",
    ]));

    assert_eq!(output.status.code(), Some(9));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "ok");
}

#[cfg(unix)]
#[test]
fn test_exec_handoff_keeps_the_gate_pid() {
    let dir = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let child = gate(dir.path())
        .args(["--exec", "--tcp", &address, "--", "sh", "-c", "echo $$"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let gate_pid = child.id();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        gate_pid.to_string()
    );
}

#[cfg(unix)]
mod signals {
    use super::*;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::time::{Duration, Instant};

    fn wait_for(path: &Path) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !path.exists() {
            assert!(Instant::now() < deadline, "command never started");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_sigterm_is_forwarded_to_command() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("started");
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let script = format!(
            "trap 'exit 42' TERM; touch {}; while true; do sleep 0.1; done",
            marker.display()
        );

        let mut child = gate(dir.path())
            .args(["--tcp", &address, "--", "sh", "-c", &script])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        wait_for(&marker);
        kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).unwrap();

        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(42));
    }

    #[test]
    fn test_child_killed_by_signal_reports_128_plus_n() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

        let output = run(gate(dir.path()).args(["--tcp", &address, "--", "sh", "-c", "kill -KILL $$"]));
        assert_eq!(output.status.code(), Some(128 + 9));
    }
}
