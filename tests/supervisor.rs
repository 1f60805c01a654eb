mod common;

use std::fs;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::json;

use common::*;

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn true_exits_zero() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = write_json_config(dir.path(), &json!({"Programs": {"a": ["/bin/true"]}}));

    assert_eq!(run_config(&config, &[], TIMEOUT), 0);
}

#[test]
fn false_exits_one() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = write_json_config(dir.path(), &json!({"Programs": {"a": ["/bin/false"]}}));

    assert_eq!(run_config(&config, &[], TIMEOUT), 1);
}

#[test]
fn missing_executable_exits_one() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = write_json_config(
        dir.path(),
        &json!({"Programs": {"a": ["/nonexistent/vermilion/program"]}}),
    );

    assert_eq!(run_config(&config, &[], TIMEOUT), 1);
}

#[test]
fn first_exit_wins_and_others_are_terminated() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let started = dir.path().join("started");
    let terminated = dir.path().join("terminated");

    let sleeper = write_script(
        dir.path(),
        "sleeper.sh",
        &format!(
            "trap 'touch {}; exit 0' TERM\ntouch {}\nwhile true; do sleep 0.1; done\n",
            terminated.display(),
            started.display()
        ),
    );
    let quick = write_script(
        dir.path(),
        "quick.sh",
        &format!(
            "while [ ! -f {} ]; do sleep 0.05; done\nexit 3\n",
            started.display()
        ),
    );

    let config = write_json_config(
        dir.path(),
        &json!({"Programs": {
            "sleeper": ["/bin/sh", sleeper],
            "quick": ["/bin/sh", quick],
        }}),
    );

    assert_eq!(
        run_config(&config, &["--teardown-signal", "SIGTERM"], TIMEOUT),
        3
    );
    assert!(
        wait_for_file(&terminated, Duration::from_secs(5)),
        "sleeper never saw SIGTERM"
    );
}

#[cfg(target_os = "linux")]
#[test]
fn teardown_kills_by_default() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("sleeper.pid");

    let config = write_json_config(
        dir.path(),
        &json!({"Programs": {
            "sleeper": ["/bin/sh", "-c", format!("echo $$ > {}; exec sleep 30", pid_file.display())],
            "quick": ["/bin/sh", "-c", format!("while [ ! -s {} ]; do sleep 0.05; done; exit 4", pid_file.display())],
        }}),
    );

    assert_eq!(run_config(&config, &[], TIMEOUT), 4);

    let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    let stat = format!("/proc/{}/stat", pid);

    // either already reaped or a zombie waiting on its new parent
    let gone = (0..250).any(|_| {
        let done = match fs::read_to_string(&stat) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map_or(false, |rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        };
        if !done {
            std::thread::sleep(Duration::from_millis(20));
        }
        done
    });
    assert!(gone, "sleeper {} is still running", pid);
}

#[test]
fn templated_requirement_gates_launch() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");
    let started = dir.path().join("started");

    let config = write_config(
        dir.path(),
        r#"{
  "Programs": {
    "a": {
      "Args": ["/bin/sh", "-c", "touch {{ env "STARTED" }}"],
      "Requires": [{"File": "{{ env "FOO" }}"}]
    }
  }
}"#,
    );

    let mut child = supervisor_cmd()
        .env("FOO", &ready)
        .env("STARTED", &started)
        .args(&["--poll-interval", "100"])
        .arg(&config)
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_millis(600));
    assert!(child.try_wait().unwrap().is_none(), "exited before ready");
    assert!(!started.exists(), "started before ready");

    fs::write(&ready, b"").unwrap();

    let status = wait_timeout(&mut child, TIMEOUT).expect("did not exit after ready");
    assert_eq!(status.code(), Some(0));
    assert!(started.exists());
}

#[test]
fn requirement_with_default_interval() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");

    let config = write_json_config(
        dir.path(),
        &json!({"Programs": {"a": {
            "Args": ["/bin/sh", "-c", "exit 6"],
            "Requires": [{"File": ready}],
        }}}),
    );

    let mut child = supervisor_cmd().arg(&config).spawn().unwrap();

    std::thread::sleep(Duration::from_millis(1500));
    assert!(child.try_wait().unwrap().is_none());

    fs::write(&ready, b"").unwrap();

    // one more poll interval, plus slack
    let status = wait_timeout(&mut child, Duration::from_secs(3)).expect("not unblocked");
    assert_eq!(status.code(), Some(6));
}

#[test]
fn requirement_timeout_exits_one() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let started = dir.path().join("started");

    let config = write_json_config(
        dir.path(),
        &json!({"Programs": {"a": {
            "Args": ["/bin/sh", "-c", format!("touch {}", started.display())],
            "Requires": [{"File": dir.path().join("never")}],
        }}}),
    );

    let code = run_config(
        &config,
        &["--require-timeout", "1", "--poll-interval", "100"],
        TIMEOUT,
    );

    assert_eq!(code, 1);
    assert!(!started.exists());
}

#[test]
fn huge_requirement_timeout_still_launches() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");
    fs::write(&ready, b"").unwrap();

    let config = write_json_config(
        dir.path(),
        &json!({"Programs": {"a": {
            "Args": ["/bin/sh", "-c", "exit 6"],
            "Requires": [{"File": ready}],
        }}}),
    );

    let code = run_config(&config, &["--require-timeout", &u64::MAX.to_string()], TIMEOUT);
    assert_eq!(code, 6);
}

#[test]
fn empty_args_launches_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let started = dir.path().join("started");

    let config = write_json_config(
        dir.path(),
        &json!({"Programs": {
            "good": ["/bin/sh", "-c", format!("touch {}", started.display())],
            "bad": {"Args": []},
        }}),
    );

    assert_eq!(run_config(&config, &[], TIMEOUT), 1);

    std::thread::sleep(Duration::from_millis(200));
    assert!(!started.exists());
}

#[test]
fn signals_are_relayed_to_every_program() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let mut got_hup = Vec::new();
    let mut programs = serde_json::Map::new();
    for name in &["first", "second"] {
        let ready = dir.path().join(format!("{}.ready", name));
        let got = dir.path().join(format!("{}.hup", name));

        let trapper = write_script(
            dir.path(),
            &format!("{}.sh", name),
            &format!(
                "trap 'touch {}' HUP\ntouch {}\nwhile true; do sleep 0.1; done\n",
                got.display(),
                ready.display()
            ),
        );

        programs.insert(name.to_string(), json!(["/bin/sh", trapper]));
        got_hup.push((ready, got));
    }
    // never launched, must not get in the way of relaying
    programs.insert(
        "gated".to_string(),
        json!({
            "Args": ["/bin/true"],
            "Requires": [{"File": dir.path().join("never")}],
        }),
    );

    let config = write_json_config(dir.path(), &json!({ "Programs": programs }));

    let mut child = supervisor_cmd().arg(&config).spawn().unwrap();
    for (ready, _) in &got_hup {
        assert!(wait_for_file(ready, TIMEOUT), "{} never started", ready.display());
    }

    let supervisor = Pid::from_raw(child.id() as i32);
    kill(supervisor, Signal::SIGHUP).unwrap();
    for (_, got) in &got_hup {
        assert!(wait_for_file(got, TIMEOUT), "{} not written", got.display());
    }

    kill(supervisor, Signal::SIGTERM).unwrap();
    let status = wait_timeout(&mut child, TIMEOUT).expect("SIGTERM was not relayed");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn sigusr1_is_relayed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");

    let trapper = write_script(
        dir.path(),
        "trapper.sh",
        &format!(
            "trap 'exit 7' USR1\ntouch {}\nwhile true; do sleep 0.1; done\n",
            ready.display()
        ),
    );

    let config = write_json_config(dir.path(), &json!({"Programs": {"trapper": ["/bin/sh", trapper]}}));

    let mut child = supervisor_cmd().arg(&config).spawn().unwrap();
    assert!(wait_for_file(&ready, TIMEOUT), "trapper never started");

    kill(Pid::from_raw(child.id() as i32), Signal::SIGUSR1).unwrap();

    let status = wait_timeout(&mut child, TIMEOUT).expect("signal was not relayed");
    assert_eq!(status.code(), Some(7));
}

#[test]
fn sigchld_is_relayed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");

    // only builtins, so the program never gets a SIGCHLD of its own
    let trapper = write_script(
        dir.path(),
        "trapper.sh",
        &format!(
            "trap 'exit 5' CHLD\necho $$ > {}\nwhile :; do :; done\n",
            ready.display()
        ),
    );

    let config = write_json_config(dir.path(), &json!({"Programs": {"trapper": ["/bin/sh", trapper]}}));

    let mut child = supervisor_cmd().arg(&config).spawn().unwrap();
    assert!(wait_for_file(&ready, TIMEOUT), "trapper never started");

    kill(Pid::from_raw(child.id() as i32), Signal::SIGCHLD).unwrap();

    let status = wait_timeout(&mut child, TIMEOUT);
    if status.is_none() {
        // the supervisor is gone, don't leave the trapper spinning
        if let Ok(pid) = fs::read_to_string(&ready).unwrap().trim().parse::<i32>() {
            kill(Pid::from_raw(pid), Signal::SIGKILL).ok();
        }
    }
    assert_eq!(status.expect("SIGCHLD was not relayed").code(), Some(5));
}

#[test]
fn relay_keeps_listening() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ready = dir.path().join("ready");
    let hups = dir.path().join("hups");

    let counter = write_script(
        dir.path(),
        "counter.sh",
        &format!(
            "trap 'echo hup >> {hups}' HUP\ntrap 'exit 9' USR2\ntouch {ready}\nwhile true; do sleep 0.1; done\n",
            hups = hups.display(),
            ready = ready.display()
        ),
    );

    let config = write_json_config(dir.path(), &json!({"Programs": {"counter": ["/bin/sh", counter]}}));

    let mut child = supervisor_cmd().arg(&config).spawn().unwrap();
    assert!(wait_for_file(&ready, TIMEOUT), "counter never started");

    let supervisor = Pid::from_raw(child.id() as i32);
    kill(supervisor, Signal::SIGHUP).unwrap();
    assert!(wait_for_file(&hups, TIMEOUT), "first signal not relayed");

    kill(supervisor, Signal::SIGUSR2).unwrap();
    let status = wait_timeout(&mut child, TIMEOUT).expect("second signal not relayed");
    assert_eq!(status.code(), Some(9));
}

#[cfg(target_os = "linux")]
#[test]
fn orphans_are_reaped_as_subreaper() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let orphan_pid = dir.path().join("orphan.pid");

    let parent = write_script(
        dir.path(),
        "parent.sh",
        &format!(
            "/bin/sh -c 'sleep 0.2 & echo $! > {}'\nsleep 30\n",
            orphan_pid.display()
        ),
    );

    let config = write_json_config(dir.path(), &json!({"Programs": {"parent": ["/bin/sh", parent]}}));

    let mut child = supervisor_cmd()
        .arg("--subreaper")
        .arg(&config)
        .spawn()
        .unwrap();

    assert!(wait_for_file(&orphan_pid, TIMEOUT), "orphan never started");
    std::thread::sleep(Duration::from_millis(100));
    let pid: i32 = fs::read_to_string(&orphan_pid).unwrap().trim().parse().unwrap();
    let proc_dir = format!("/proc/{}", pid);

    let reaped = (0..150).any(|_| {
        std::thread::sleep(Duration::from_millis(20));
        !std::path::Path::new(&proc_dir).exists()
    });

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).unwrap();
    let status = wait_timeout(&mut child, TIMEOUT).expect("did not exit on SIGTERM");

    assert!(reaped, "orphan {} was left a zombie", pid);
    // the shell was killed by the relayed SIGTERM
    assert_eq!(status.code(), Some(1));
}
