use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// The donor source is missing or unreadable. Callers may substitute fallback data.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("donor data not found at {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("failed to open donor data at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("donor data at {} is missing column {column}", .path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("failed to read donor data from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("donor data at {} has no rows", .path.display())]
    Empty { path: PathBuf },
}

/// Feature data that prevents a model from being fitted.
#[derive(Debug, Error, PartialEq)]
pub enum ModelFitError {
    #[error("cannot fit a model on an empty donor table")]
    EmptyTable,
    #[error("non-finite value in column {column} at row {row}")]
    NonFiniteFeature { row: usize, column: &'static str },
    #[error("tree count must be at least 1")]
    InvalidTreeCount,
    #[error("cluster count must be at least 1")]
    InvalidClusterCount,
}

/// A collaborator call that did not produce a live value.
///
/// Never propagated as a hard failure: it travels inside the batch provenance.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExternalSignalError {
    #[error("no API credential configured")]
    MissingCredential,
    #[error("collaborator endpoint not configured")]
    NotConfigured,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("api error {code}: {message}")]
    Api { code: String, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ExternalSignalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExternalSignalError::Timeout
        } else if err.is_decode() {
            ExternalSignalError::Malformed(err.to_string())
        } else {
            ExternalSignalError::Transport(err.to_string())
        }
    }
}

/// Failures that abort a pipeline run and are reported to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    ModelFit(#[from] ModelFitError),
}
