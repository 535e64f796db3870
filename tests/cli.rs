//! Startup failures must end the process before it binds a socket.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn run_with_config(path: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_picam-snapshot"))
        .arg("-c")
        .arg(path)
        .env("RUST_LOG", "info")
        .output()
        .expect("failed to run picam-snapshot")
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn assert_failed_before_bind(output: &Output) {
    assert!(!output.status.success(), "process should exit non-zero");
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        !stdout.contains("Snapshot server listening"),
        "server must not bind: {stdout}"
    );
}

#[test]
fn missing_config_exits_non_zero() {
    let dir = tempdir().unwrap();
    let output = run_with_config(&dir.path().join("absent.yaml"));
    assert_failed_before_bind(&output);
}

#[test]
fn malformed_config_exits_non_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "web: [this is: not, a mapping\n").unwrap();
    assert_failed_before_bind(&run_with_config(&path));
}

#[test]
fn empty_config_exits_non_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "").unwrap();
    assert_failed_before_bind(&run_with_config(&path));
}

#[test]
fn unknown_backend_exits_non_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "camera:\n  backend: webcam9000\n").unwrap();
    assert_failed_before_bind(&run_with_config(&path));
}

#[test]
fn camera_init_failure_exits_non_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    let config = format!(
        "web:\n  host: 127.0.0.1\n  port: {}\n  placeholder_image: null\n\
         camera:\n  backend: rpicam\n  command: {}\n\
         camera_config_path: {}\n",
        free_port(),
        dir.path().join("no-such-rpicam-still").display(),
        dir.path().join("camera.yaml").display(),
    );
    std::fs::write(&path, config).unwrap();

    let output = run_with_config(&path);
    assert_failed_before_bind(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("camera initialization failed"), "{stdout}");
}
