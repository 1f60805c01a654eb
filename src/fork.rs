// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::ProgramSpec;

struct StdIoConf {
    stdin: Stdio,
    stderr: Stdio,
    stdout: Stdio,
}

impl Default for StdIoConf {
    /// Programs write straight to our own stdout and stderr, nothing is captured
    fn default() -> Self {
        Self {
            stdin: Stdio::null(),
            stderr: Stdio::inherit(),
            stdout: Stdio::inherit(),
        }
    }
}

/// Spawn the program described by `spec`, `args[0]` is the executable
pub fn new_process(spec: &ProgramSpec) -> io::Result<Child> {
    new_process_with(spec, StdIoConf::default())
}

fn new_process_with(spec: &ProgramSpec, stdio: StdIoConf) -> io::Result<Child> {
    let (program, args) = spec
        .args
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

    // FIXME: clear env? set working directory? uid/gid?
    Command::new(program)
        .args(args)
        .stdin(stdio.stdin)
        .stdout(stdio.stdout)
        .stderr(stdio.stderr)
        .spawn()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let spec = ProgramSpec::new(vec!["/bin/sh", "-c", "exit 4"]);
        let mut child = new_process(&spec).unwrap();

        assert!(child.id().is_some());
        assert_eq!(child.wait().await.unwrap().code(), Some(4));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let err = new_process(&ProgramSpec::default()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let spec = ProgramSpec::new(vec!["/nonexistent/vermilion/program"]);
        assert!(new_process(&spec).is_err());
    }
}
