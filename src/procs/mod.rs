// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The cooperating parts of the init process
//!
//! ```text
//!   Supervisor ──spawns──► Launcher (per program) ──► ReadinessGate ──► child process
//!       ▲                        │
//!       └──── first Outcome ◄────┘
//!
//!   SignalRelay ──forwards every signal──► Children ◄── Reaper (orphans on SIGCHLD)
//! ```

mod children;
mod gate;
mod launcher;
mod reaper;
mod relay;
mod supervisor;

pub use children::Children;
pub use gate::{GateResult, Precondition, ReadinessGate};
pub use launcher::Launcher;
pub use reaper::Reaper;
pub use relay::{parse_signal, relayed_signals, signal_name, SignalRelay};
pub use supervisor::{State, Supervisor, SupervisorOptions};

/// Exit code used when a program's real exit status is unavailable
///
/// This covers programs that could not be started, were killed by a signal, or
/// never got past their readiness requirements.
pub const FALLBACK_EXIT_CODE: i32 = 1;

/// The result of one program, produced exactly once per [`Launcher`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub name: String,
    pub exit_code: i32,
}

impl Outcome {
    pub fn new(name: impl Into<String>, exit_code: i32) -> Self {
        Self {
            name: name.into(),
            exit_code,
        }
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self::new(name, FALLBACK_EXIT_CODE)
    }
}
