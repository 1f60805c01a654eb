// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::process::ExitStatus;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ProgramSpec;
use crate::fork::new_process;
use crate::procs::{Children, GateResult, Outcome, ReadinessGate, FALLBACK_EXIT_CODE};

/// Launch one program and report how it ended
///
/// Rules:
/// - waits for the program's requirements before starting it
/// - the program's stdout and stderr are our own
/// - sends exactly one `Outcome`, whatever happens
#[derive(Clone, Debug)]
pub struct Launcher {
    children: Children,
    gate: ReadinessGate,
    outcomes: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
}

impl Launcher {
    pub fn new(
        children: Children,
        gate: ReadinessGate,
        outcomes: mpsc::Sender<Outcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            children,
            gate,
            outcomes,
            cancel,
        }
    }

    pub async fn run(self, name: String, spec: ProgramSpec) {
        let exit_code = self.launch(&name, &spec).await;

        // the supervisor may already be tearing down and gone
        self.outcomes
            .send(Outcome::new(name, exit_code))
            .await
            .ok();
    }

    async fn launch(&self, name: &str, spec: &ProgramSpec) -> i32 {
        if !spec.requires.is_empty() {
            info!(program = %name, "making sure that all requirements are good");

            match self.gate.await_ready(name, &spec.requires, &self.cancel).await {
                GateResult::Ready => (),
                GateResult::TimedOut => {
                    error!(program = %name, "timed out waiting on requirements");
                    return FALLBACK_EXIT_CODE;
                }
                GateResult::Cancelled => {
                    info!(program = %name, "abandoned while waiting on requirements");
                    return FALLBACK_EXIT_CODE;
                }
            }

            if self.cancel.is_cancelled() {
                info!(program = %name, "ready after shutdown began, not starting");
                return FALLBACK_EXIT_CODE;
            }
        }

        info!(program = %name, cmd = ?spec.args, "running");

        let mut child = match self.children.spawn(name, || new_process(spec)) {
            Ok(child) => child,
            Err(e) => {
                error!(program = %name, error = %e, "failed to start");
                return FALLBACK_EXIT_CODE;
            }
        };

        let status = child.wait().await;
        self.children.remove(name);

        match status {
            Ok(status) => exit_code(name, status),
            Err(e) => {
                error!(program = %name, error = %e, "unable to get exit status");
                FALLBACK_EXIT_CODE
            }
        }
    }
}

fn exit_code(name: &str, status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => {
            info!(program = %name, code, "saw exit status");
            code
        }
        None => {
            use std::os::unix::process::ExitStatusExt;

            warn!(program = %name, signal = ?status.signal(), "terminated by signal");
            FALLBACK_EXIT_CODE
        }
    }
}
