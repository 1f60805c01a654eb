use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("nix error: {0}")]
    NixError(#[from] nix::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("template error on line {line}: {msg}")]
    Template { line: usize, msg: String },
    #[error("unable to load config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
    #[error("unable to run empty command {0}")]
    EmptyArgs(String),
    #[error("no programs configured")]
    NoPrograms,
    #[error("unknown signal: {0}")]
    UnknownSignal(String),
    #[error("an error occured: {0}")]
    ErrorMsg(String),
    #[error("an error occured: {0}")]
    ErrorStr(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub(crate) fn template(line: usize, msg: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Template {
            line,
            msg: msg.into(),
        })
    }

    pub(crate) fn config(path: impl Into<PathBuf>, source: Error) -> Self {
        Self::from_kind(ErrorKind::Config {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Self::from_kind(ErrorKind::ErrorStr(err))
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Self::from_kind(ErrorKind::ErrorMsg(err))
    }
}
