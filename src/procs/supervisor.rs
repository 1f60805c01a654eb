// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use libc::c_int;
use nix::unistd::Pid;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Configuration;
use crate::procs::{signal_name, Children, Launcher, ReadinessGate, Reaper, SignalRelay};
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Validating,
    Launching,
    Running,
    Teardown,
    Exited,
}

#[derive(Clone, Copy, Debug)]
pub struct SupervisorOptions {
    pub gate: ReadinessGate,
    /// Sent to every remaining program once the first one exits
    pub teardown_signal: c_int,
    pub reap_orphans: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            gate: ReadinessGate::default(),
            teardown_signal: libc::SIGKILL,
            reap_orphans: false,
        }
    }
}

/// Launch and monitor processes
///
/// Rules:
///   - nothing is started unless every program is valid
///   - signals received are passed on to all programs
///   - the first program to exit ends the run, its exit code is ours
///   - no restarts
pub struct Supervisor {
    config: Configuration,
    options: SupervisorOptions,
    children: Children,
    state: State,
}

impl Supervisor {
    pub fn new(config: Configuration, options: SupervisorOptions) -> Self {
        Self {
            config,
            options,
            children: Children::new(),
            state: State::Validating,
        }
    }

    fn transition(&mut self, next: State) {
        debug!(from = ?self.state, to = ?next, "supervisor state");
        self.state = next;
    }

    /// Run every program until the first one exits, returning its exit code
    ///
    /// The returned code is the only result of the run; remaining programs have
    /// been sent the teardown signal but may still be shutting down.
    pub async fn run(mut self) -> Result<i32, Error> {
        self.config.validate()?;

        let pid = Pid::this();
        if pid.as_raw() != 1 {
            info!(%pid, "it would be better to run as PID 1");
        }

        self.transition(State::Launching);

        let reaper = if self.options.reap_orphans {
            Some(Reaper::new(self.children.clone()))
        } else {
            None
        };

        // listen before anything starts, so that signals sent during readiness checks are passed on
        let relay = SignalRelay::install(self.children.clone(), reaper);
        tokio::spawn(relay.run());

        let cancel = CancellationToken::new();
        let programs = std::mem::take(&mut self.config.programs);
        // room for every outcome, a Launcher never waits on a supervisor that stopped listening
        let (outcomes, mut first) = mpsc::channel(programs.len());

        for (name, spec) in programs {
            let launcher = Launcher::new(
                self.children.clone(),
                self.options.gate,
                outcomes.clone(),
                cancel.clone(),
            );
            tokio::spawn(launcher.run(name, spec));
        }
        drop(outcomes);

        self.transition(State::Running);

        let outcome = first
            .recv()
            .await
            .ok_or("every program ended without an outcome")?;

        info!(
            program = %outcome.name,
            code = outcome.exit_code,
            "program exited, killing everything and shutting down"
        );

        self.transition(State::Teardown);

        // programs still waiting on requirements are never started
        cancel.cancel();

        let signalled = self.children.signal_all(self.options.teardown_signal);
        if signalled > 0 {
            info!(
                signal = %signal_name(self.options.teardown_signal),
                count = signalled,
                "signalled remaining programs"
            );
        } else if !self.children.is_empty() {
            warn!("unable to signal remaining programs");
        }

        self.transition(State::Exited);
        Ok(outcome.exit_code)
    }
}
