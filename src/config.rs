// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Configuration of the programs to run
//!
//! The file is first expanded as a template (see [`crate::template`]) and then parsed as JSON:
//!
//! ```json
//! {
//!   "Programs": {
//!     "web": ["/usr/bin/web", "--port", "8080"],
//!     "worker": {
//!       "Args": ["/usr/bin/worker"],
//!       "Requires": [{"File": "{{ env "READY_FILE" }}"}]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::ErrorKind;
use crate::template;
use crate::Error;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Configuration {
    #[serde(rename = "Programs", default)]
    pub programs: BTreeMap<String, ProgramSpec>,
}

impl Configuration {
    /// All or nothing, any program without a command fails the entire configuration
    pub fn validate(&self) -> Result<(), Error> {
        if self.programs.is_empty() {
            return Err(ErrorKind::NoPrograms.into());
        }

        for (name, program) in &self.programs {
            if program.args.is_empty() {
                return Err(ErrorKind::EmptyArgs(name.clone()).into());
            }
        }

        Ok(())
    }
}

/// A program to launch, `args[0]` is the executable
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(from = "RawProgram")]
pub struct ProgramSpec {
    pub args: Vec<String>,
    pub requires: Vec<Requirement>,
}

impl ProgramSpec {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            requires: Vec::new(),
        }
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }
}

/// A precondition that must hold before a program is started
#[derive(Clone, Debug, PartialEq)]
pub enum Requirement {
    FileExists(PathBuf),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProgram {
    Args(Vec<String>),
    Spec {
        #[serde(rename = "Args", default)]
        args: Vec<String>,
        #[serde(rename = "Requires", default, deserialize_with = "requirements")]
        requires: Vec<Requirement>,
    },
}

impl From<RawProgram> for ProgramSpec {
    fn from(raw: RawProgram) -> Self {
        match raw {
            RawProgram::Args(args) => Self {
                args,
                requires: Vec::new(),
            },
            RawProgram::Spec { args, requires } => Self { args, requires },
        }
    }
}

#[derive(Deserialize)]
struct RawRequirement {
    #[serde(rename = "File", default)]
    file: Option<String>,
}

/// Empty requirements are dropped, they place no condition on the program
fn requirements<'de, D>(deserializer: D) -> Result<Vec<Requirement>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<RawRequirement>> = Option::deserialize(deserializer)?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|r| r.file)
        .filter(|file| !file.is_empty())
        .map(|file| Requirement::FileExists(PathBuf::from(file)))
        .collect())
}

/// Parse an already expanded configuration document
pub fn from_str(json: &str) -> Result<Configuration, Error> {
    Ok(serde_json::from_str(json)?)
}

/// Read, expand and parse the configuration at `path`
///
/// This does not validate the programs, see [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Configuration, Error> {
    let path = path.as_ref();

    let contents = fs::read_to_string(path).map_err(|e| Error::config(path, e.into()))?;
    let expanded = template::expand_env(&contents).map_err(|e| Error::config(path, e))?;

    from_str(&expanded).map_err(|e| Error::config(path, e))
}

pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Configuration, Error> {
    let path = path.as_ref();

    let config = load_from_path(path)?;
    config.validate().map_err(|e| Error::config(path, e))?;

    Ok(config)
}
