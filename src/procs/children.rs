// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use nix::errno::Errno;
use nix::unistd::Pid;
use tokio::process::Child;
use tracing::debug;

/// Process ids of every program that is currently running
///
/// Programs are added as they are spawned and removed once their exit status has
/// been collected. Cloning shares the same set.
#[derive(Clone, Debug, Default)]
pub struct Children {
    inner: Arc<Mutex<HashMap<String, Pid>>>,
}

impl Children {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<String, Pid>> {
        // nothing in the map can be left half updated, so poisoning is ignored
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawns with `spawn` and records the new pid before anyone else can look at the set
    pub fn spawn<F>(&self, name: &str, spawn: F) -> io::Result<Child>
    where
        F: FnOnce() -> io::Result<Child>,
    {
        let mut children = self.lock();
        let child = spawn()?;

        // no id means it was already reaped, there is nothing to signal
        if let Some(pid) = child.id() {
            children.insert(name.to_string(), Pid::from_raw(pid as libc::pid_t));
        }

        Ok(child)
    }

    pub fn remove(&self, name: &str) -> Option<Pid> {
        self.lock().remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<(String, Pid)> {
        self.lock()
            .iter()
            .map(|(name, pid)| (name.clone(), *pid))
            .collect()
    }

    /// Deliver `signo` to every running program, returns the number that accepted it
    ///
    /// Failures, e.g. a program that exited a moment ago, are ignored.
    pub fn signal_all(&self, signo: libc::c_int) -> usize {
        let mut delivered = 0;

        for (name, pid) in self.snapshot() {
            match send_signal(pid, signo) {
                Ok(()) => {
                    debug!(program = %name, %pid, signal = signo, "signal delivered");
                    delivered += 1;
                }
                Err(e) => debug!(program = %name, %pid, signal = signo, error = %e, "signal not delivered"),
            }
        }

        delivered
    }
}

/// Unlike `nix::sys::signal::kill` this accepts real-time signals too
fn send_signal(pid: Pid, signo: libc::c_int) -> nix::Result<()> {
    // safe, kill has no memory effects
    let res = unsafe { libc::kill(pid.as_raw(), signo) };
    Errno::result(res).map(drop)
}
