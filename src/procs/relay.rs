// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::convert::TryFrom;

use futures::stream::{self, StreamExt};
use libc::c_int;
use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info};

use crate::error::ErrorKind;
use crate::procs::{Children, Reaper};
use crate::Error;

/// Signals that can not be caught, or only mean a fault in this process
const UNRELAYABLE: &[Signal] = &[
    Signal::SIGKILL,
    Signal::SIGSTOP,
    Signal::SIGILL,
    Signal::SIGFPE,
    Signal::SIGSEGV,
];

/// Forward every signal we receive to every running program
///
/// `SIGCHLD` is forwarded like the rest, and also triggers the `Reaper` if there is one.
pub struct SignalRelay {
    children: Children,
    reaper: Option<Reaper>,
    signals: Vec<(c_int, tokio::signal::unix::Signal)>,
}

impl SignalRelay {
    /// Start listening, signals arriving from here on are queued until `run`
    ///
    /// Must be called from within the tokio runtime.
    pub fn install(children: Children, reaper: Option<Reaper>) -> Self {
        let signals = relayed_signals()
            .into_iter()
            .filter_map(|signo| match signal(SignalKind::from_raw(signo)) {
                Ok(listener) => Some((signo, listener)),
                Err(e) => {
                    debug!(signal = %signal_name(signo), error = %e, "unable to listen for signal");
                    None
                }
            })
            .collect::<Vec<_>>();

        debug!(count = signals.len(), "listening for signals");

        Self {
            children,
            reaper,
            signals,
        }
    }

    /// Relay signals until the process exits
    pub async fn run(self) {
        let SignalRelay {
            children,
            reaper,
            signals,
        } = self;

        let listeners = signals.into_iter().map(|(signo, listener)| {
            stream::unfold(listener, move |mut listener| async move {
                listener.recv().await.map(|()| (signo, listener))
            })
            .boxed()
        });

        let mut incoming = stream::select_all(listeners);
        while let Some(signo) = incoming.next().await {
            if signo == libc::SIGCHLD {
                if let Some(reaper) = &reaper {
                    reaper.reap();
                }
            }

            info!(signal = %signal_name(signo), "got signal, sending along");
            let delivered = children.signal_all(signo);
            debug!(signal = %signal_name(signo), delivered, "signal relayed");
        }
    }
}

/// Every signal the relay subscribes to
pub fn relayed_signals() -> Vec<c_int> {
    #[allow(unused_mut)]
    let mut signals = Signal::iterator()
        .filter(|s| !UNRELAYABLE.contains(s))
        .map(|s| s as c_int)
        .collect::<Vec<_>>();

    #[cfg(target_os = "linux")]
    signals.extend(libc::SIGRTMIN()..=libc::SIGRTMAX());

    signals
}

pub fn signal_name(signo: c_int) -> String {
    match Signal::try_from(signo) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("signal {}", signo),
    }
}

/// Parse a signal by name, `SIGTERM`, `TERM` and `term` are all accepted, or by number
pub fn parse_signal(s: &str) -> Result<c_int, Error> {
    let s = s.trim();

    if let Ok(signo) = s.parse::<c_int>() {
        if Signal::try_from(signo).is_ok() || is_realtime(signo) {
            return Ok(signo);
        }
        return Err(ErrorKind::UnknownSignal(s.to_string()).into());
    }

    let upper = s.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };

    name.parse::<Signal>()
        .map(|signal| signal as c_int)
        .map_err(|_| ErrorKind::UnknownSignal(s.to_string()).into())
}

#[cfg(target_os = "linux")]
fn is_realtime(signo: c_int) -> bool {
    (libc::SIGRTMIN()..=libc::SIGRTMAX()).contains(&signo)
}

#[cfg(not(target_os = "linux"))]
fn is_realtime(_signo: c_int) -> bool {
    false
}
