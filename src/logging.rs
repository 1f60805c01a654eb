// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `VERMILION_LOG` environment variable (e.g. "info", "vermilion_init=debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR, STDOUT belongs to the supervised programs.

use tracing_subscriber::{fmt, EnvFilter};

use crate::Error;

pub const LOG_ENV: &str = "VERMILION_LOG";

const DEFAULT_LEVEL: &str = "info";

/// Initialise global logging subscriber, call once at startup.
pub fn init_logging(cli_level: Option<&str>) -> Result<(), Error> {
    let filter = filter(cli_level, std::env::var(LOG_ENV).ok().as_deref())?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::from(format!("failed to install logger: {}", e)))
}

fn filter(cli_level: Option<&str>, env_level: Option<&str>) -> Result<EnvFilter, Error> {
    if let Some(level) = cli_level {
        return EnvFilter::try_new(level)
            .map_err(|e| Error::from(format!("bad log level {:?}: {}", level, e)));
    }

    // an unparsable environment value falls back to the default
    Ok(env_level
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LEVEL)))
}
