#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs are captured per-test and only shown for failures, enable levels with e.g.
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// The supervisor binary, logging at debug to its stderr
pub fn supervisor_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vermilion-init"));
    cmd.env("VERMILION_LOG", "debug")
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    cmd
}

pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.json");
    fs::write(&path, contents).expect("failed to write config");
    path
}

pub fn write_json_config(dir: &Path, config: &serde_json::Value) -> PathBuf {
    write_config(dir, &config.to_string())
}

/// A shell script, run it with `/bin/sh <path>`
pub fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, body).expect("failed to write script");
    path.display().to_string()
}

/// Wait for `child` to exit, killing it if it takes longer than `timeout`
pub fn wait_timeout(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().expect("try_wait failed") {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(20));
    }

    child.kill().ok();
    child.wait().ok();
    None
}

pub fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }

    path.exists()
}

/// Runs the supervisor on `config` and returns its exit code
pub fn run_config(config: &Path, args: &[&str], timeout: Duration) -> i32 {
    let mut child = supervisor_cmd()
        .args(args)
        .arg(config)
        .spawn()
        .expect("failed to start vermilion-init");

    wait_timeout(&mut child, timeout)
        .expect("vermilion-init did not exit in time")
        .code()
        .expect("vermilion-init was killed by a signal")
}
