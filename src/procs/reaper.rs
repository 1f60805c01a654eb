// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#[cfg(target_os = "linux")]
use nix::unistd::Pid;
#[cfg(target_os = "linux")]
use tracing::debug;

use crate::procs::Children;
use crate::Error;

/// Collect exit statuses of orphans re-parented to us
///
/// As PID 1 (or a subreaper) every orphaned descendant becomes our child, and
/// remains a zombie until someone waits on it. Zombies of tracked programs are
/// left for their `Launcher`.
#[derive(Clone, Debug)]
pub struct Reaper {
    children: Children,
}

impl Reaper {
    pub fn new(children: Children) -> Self {
        Self { children }
    }

    /// Mark this process as the reaper for all of its descendants
    #[cfg(target_os = "linux")]
    pub fn become_subreaper() -> Result<(), Error> {
        // safe, only sets a flag on this process
        let res = unsafe { libc::prctl(libc::PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };
        nix::errno::Errno::result(res)?;
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    pub fn become_subreaper() -> Result<(), Error> {
        Err(Error::from("subreapers are only supported on Linux"))
    }

    /// Reap every waiting zombie that is not a tracked program, returns the number reaped
    #[cfg(target_os = "linux")]
    pub fn reap(&self) -> usize {
        use nix::sys::wait::{waitpid, WaitPidFlag};

        // holding the lock keeps a program from being spawned but not yet tracked
        let children = self.children.lock();
        let mut reaped = 0;

        while let Some(pid) = next_zombie() {
            if children.values().any(|p| *p == pid) {
                // the oldest zombie is ours to leave alone, the rest wait for the next SIGCHLD
                break;
            }

            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => {
                    debug!(%pid, ?status, "reaped orphan");
                    reaped += 1;
                }
                Err(e) => {
                    debug!(%pid, error = %e, "failed to reap orphan");
                    break;
                }
            }
        }

        reaped
    }

    #[cfg(not(target_os = "linux"))]
    pub fn reap(&self) -> usize {
        0
    }
}

/// Peek at the next exited child without collecting it
#[cfg(target_os = "linux")]
fn next_zombie() -> Option<Pid> {
    // safe, siginfo_t is plain data and waitid only writes into it
    let pid = unsafe {
        let mut info: libc::siginfo_t = std::mem::zeroed();
        let res = libc::waitid(
            libc::P_ALL,
            0,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        );

        if res != 0 {
            return None;
        }
        info.si_pid()
    };

    if pid == 0 {
        None
    } else {
        Some(Pid::from_raw(pid))
    }
}
