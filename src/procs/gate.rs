// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Requirement;

/// Something that must be true before a program may start
#[async_trait]
pub trait Precondition: Send + Sync {
    fn describe(&self) -> String;

    async fn is_satisfied(&self) -> bool;
}

#[async_trait]
impl Precondition for Requirement {
    fn describe(&self) -> String {
        match self {
            Requirement::FileExists(path) => path.display().to_string(),
        }
    }

    /// Only a definite "not found" counts as missing, e.g. permission errors mean the file is there
    async fn is_satisfied(&self) -> bool {
        match self {
            Requirement::FileExists(path) => match tokio::fs::metadata(path).await {
                Ok(_) => true,
                Err(e) => e.kind() != io::ErrorKind::NotFound,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateResult {
    Ready,
    TimedOut,
    Cancelled,
}

/// Polls the requirements of a program until all of them hold
///
/// Every pass re-checks every requirement, a requirement seen once is not remembered.
#[derive(Clone, Copy, Debug)]
pub struct ReadinessGate {
    interval: Duration,
    timeout: Option<Duration>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            timeout: None,
        }
    }
}

impl ReadinessGate {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    /// Block until one full pass finds every requirement satisfied
    ///
    /// Without a timeout this waits forever unless `cancel` fires, as does a timeout
    /// too far in the future to be a deadline.
    pub async fn await_ready<P: Precondition>(
        &self,
        name: &str,
        requirements: &[P],
        cancel: &CancellationToken,
    ) -> GateResult {
        let deadline = self.timeout.and_then(|t| Instant::now().checked_add(t));

        loop {
            if cancel.is_cancelled() {
                return GateResult::Cancelled;
            }

            let mut ready = true;
            for requirement in requirements {
                if requirement.is_satisfied().await {
                    debug!(program = %name, requirement = %requirement.describe(), "found");
                } else {
                    info!(program = %name, requirement = %requirement.describe(), "not found");
                    ready = false;
                }
            }

            if ready {
                return GateResult::Ready;
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return GateResult::TimedOut;
                }
            }

            info!(program = %name, "still waiting on requirements");

            let sleep = match deadline {
                Some(deadline) => match Instant::now().checked_add(self.interval) {
                    Some(next) => time::sleep_until(deadline.min(next)),
                    None => time::sleep_until(deadline),
                },
                None => time::sleep(self.interval),
            };

            tokio::select! {
                _ = cancel.cancelled() => return GateResult::Cancelled,
                _ = sleep => (),
            }
        }
    }
}
