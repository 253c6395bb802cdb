//! Error taxonomy shared by the session, scan and lifecycle layers.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A named resource does not exist. Never retried.
    #[error("{kind} '{name}' not found{}", format_available(.available))]
    NotFound {
        kind: &'static str,
        name: String,
        available: Option<Vec<String>>,
    },

    #[error("no targets configured, check config.yaml")]
    NoTargets,

    #[error("password not found, set environment variable: {var}")]
    MissingCredential { var: String },

    /// Authentication or network failure against one target.
    #[error("connection to '{target}' failed: {message}")]
    Connection { target: String, message: String },

    /// The endpoint reported the remote operation as failed.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// The remote operation did not reach a terminal state in time.
    /// Its outcome is unknown, it may still complete.
    #[error("task did not finish within {}s, outcome unknown", .0.as_secs())]
    Timeout(Duration),

    #[error("invalid parameters: {0}")]
    Validation(String),

    /// The operator declined a destructive operation.
    #[error("{operation} on '{resource}' rejected by user")]
    Rejected { operation: String, resource: String },

    /// The operation finished but its audit entry could not be written.
    #[error("{operation} on '{resource}' finished ({outcome}) but was not audited: {source}")]
    AuditWrite {
        operation: String,
        resource: String,
        outcome: String,
        #[source]
        source: Box<Error>,
    },

    /// The endpoint binding does not implement this primitive.
    #[error("{0} is not supported by this endpoint binding")]
    Unsupported(&'static str),

    #[error("config error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("prompt failed: {0}")]
    Prompt(String),
}

impl Error {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
            available: None,
        }
    }

    pub fn not_found_among(
        kind: &'static str,
        name: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
            available: Some(available),
        }
    }

    pub fn connection(target: impl Into<String>, message: impl ToString) -> Self {
        Error::Connection {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

fn format_available(available: &Option<Vec<String>>) -> String {
    match available {
        None => String::new(),
        Some(names) if names.is_empty() => ". Available: none".to_string(),
        Some(names) => format!(". Available: {}", names.join(", ")),
    }
}
