//! Error kinds for a convergence run.
//!
//! `Config` and `Template` errors are raised before the first resource
//! executes. `HostProbe` and `Apply` halt a run at the failing resource.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::resource::ResourceId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The attribute tree or the declared resource graph is invalid.
    #[error("configuration error at `{path}`: {reason}")]
    Config { path: String, reason: String },

    /// Host state could not be read and no safe fallback applies.
    #[error("cannot probe {what}: {source}")]
    HostProbe {
        what: String,
        #[source]
        source: HostError,
    },

    /// An external action failed while converging `resource`.
    #[error("{resource} failed: {cause}")]
    Apply { resource: ResourceId, cause: String },

    /// A template variable is missing or cannot be written in the
    /// template's format.
    #[error("template `{source_name}`: variable `{variable}` {reason}")]
    Template {
        source_name: String,
        variable: String,
        reason: String,
    },
}

impl Error {
    pub fn config(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Config {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn template(source_name: &str, variable: &str, reason: impl Into<String>) -> Self {
        Error::Template {
            source_name: source_name.to_string(),
            variable: variable.to_string(),
            reason: reason.into(),
        }
    }

    pub fn probe(what: impl Into<String>, source: HostError) -> Self {
        Error::HostProbe {
            what: what.into(),
            source,
        }
    }

    /// Errors raised before any resource was touched.
    pub fn is_pre_execution(&self) -> bool {
        matches!(self, Error::Config { .. } | Error::Template { .. })
    }
}

/// Failure of a single host capability (probe or mutation).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{0}")]
    Unsupported(String),
}

impl HostError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {}", describe_status(.status), .stderr.trim())]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}
