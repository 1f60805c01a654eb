// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::ffi::{OsStr, OsString};
use std::time::Duration;

use clap::{App, Arg, ArgMatches};
use nix::unistd::Pid;
use tokio::runtime;
use tracing::{error, warn};

use vermilion_init::config;
use vermilion_init::logging;
use vermilion_init::procs::{self, ReadinessGate, Reaper, Supervisor, SupervisorOptions};
use vermilion_init::Error;

const CONFIG: &str = "CONFIG";
const LOG_LEVEL: &str = "log-level";
const TEARDOWN_SIGNAL: &str = "teardown-signal";
const REQUIRE_TIMEOUT: &str = "require-timeout";
const POLL_INTERVAL: &str = "poll-interval";
const SUBREAPER: &str = "subreaper";

/// Exit code for usage and configuration errors
const EXIT_FAILURE: i32 = 1;

trait SetupClapApp {
    fn setup_clap_app(self) -> Self;
}

impl<'a, 'b> SetupClapApp for App<'a, 'b> {
    fn setup_clap_app(self) -> Self {
        self.version(env!("CARGO_PKG_VERSION"))
            .author(env!("CARGO_PKG_AUTHORS"))
    }
}

fn is_number(i: &OsStr) -> Result<(), OsString> {
    i.to_string_lossy()
        .parse::<u64>()
        .map(|_| ())
        .map_err(|_| OsString::from("number was expected"))
}

fn is_positive_number(i: &OsStr) -> Result<(), OsString> {
    match i.to_string_lossy().parse::<u64>() {
        Ok(0) => Err(OsString::from("must be greater than zero")),
        Ok(_) => Ok(()),
        Err(_) => Err(OsString::from("number was expected")),
    }
}

fn app() -> App<'static, 'static> {
    App::new(env!("CARGO_PKG_NAME"))
        .setup_clap_app()
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name(CONFIG)
                .help("configuration file listing the programs to run")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name(LOG_LEVEL)
                .long(LOG_LEVEL)
                .value_name("FILTER")
                .help("log filter, e.g. info or debug, overrides VERMILION_LOG")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(TEARDOWN_SIGNAL)
                .long(TEARDOWN_SIGNAL)
                .value_name("SIGNAL")
                .default_value("SIGKILL")
                .validator(|s| procs::parse_signal(&s).map(drop).map_err(|e| e.to_string()))
                .help("signal sent to the remaining programs once one exits")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(REQUIRE_TIMEOUT)
                .long(REQUIRE_TIMEOUT)
                .value_name("SECONDS")
                .validator_os(is_number)
                .help("give up on a program whose requirements are not met in time, waits forever by default")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(POLL_INTERVAL)
                .long(POLL_INTERVAL)
                .value_name("MILLISECONDS")
                .default_value("1000")
                .validator_os(is_positive_number)
                .help("time between checks of a program's requirements")
                .takes_value(true),
        )
        .arg(
            Arg::with_name(SUBREAPER)
                .long(SUBREAPER)
                .help("adopt and reap orphaned descendants even when not PID 1 (Linux only)"),
        )
}

fn main() {
    let args = app().get_matches();

    if let Err(e) = logging::init_logging(args.value_of(LOG_LEVEL)) {
        eprintln!("{}", e);
        std::process::exit(EXIT_FAILURE);
    }

    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            EXIT_FAILURE
        }
    };

    std::process::exit(code);
}

fn run(args: &ArgMatches<'_>) -> Result<i32, Error> {
    let config_path = args
        .value_of_os(CONFIG)
        .ok_or("Please pass the configuration file to use as the first argument")?;
    let config = config::load_and_validate(config_path)?;

    let options = options(args)?;

    let runtime = runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(Supervisor::new(config, options).run())
}

fn options(args: &ArgMatches<'_>) -> Result<SupervisorOptions, Error> {
    let teardown_signal = procs::parse_signal(args.value_of(TEARDOWN_SIGNAL).unwrap_or("SIGKILL"))?;

    let interval = args
        .value_of(POLL_INTERVAL)
        .map(|ms| ms.parse::<u64>().map(Duration::from_millis))
        .transpose()
        .map_err(|e| Error::from(format!("bad {}: {}", POLL_INTERVAL, e)))?
        .unwrap_or(ReadinessGate::DEFAULT_INTERVAL);

    let timeout = args
        .value_of(REQUIRE_TIMEOUT)
        .map(|secs| secs.parse::<u64>().map(Duration::from_secs))
        .transpose()
        .map_err(|e| Error::from(format!("bad {}: {}", REQUIRE_TIMEOUT, e)))?;

    let mut reap_orphans = Pid::this().as_raw() == 1;
    if args.is_present(SUBREAPER) {
        match Reaper::become_subreaper() {
            Ok(()) => reap_orphans = true,
            Err(e) => warn!(error = %e, "unable to become a subreaper"),
        }
    }

    Ok(SupervisorOptions {
        gate: ReadinessGate::new(interval, timeout),
        teardown_signal,
        reap_orphans,
    })
}
