use std::path::PathBuf;
use std::time::Duration;

use crate::template::TemplateError;

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors. All of them are raised before any virtual user starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("invalid JSON path `{path}`: {message}")]
    JsonPath { path: String, message: String },

    #[error("invalid check: {0}")]
    InvalidCheck(String),

    #[error("failed to read feeder file `{path}`: {source}")]
    FeederIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid feeder data: {0}")]
    FeederCsv(#[from] csv::Error),

    #[error("pause bounds are inverted: min {min:?} > max {max:?}")]
    InvalidPause { min: Duration, max: Duration },

    #[error("invalid injection step: {0}")]
    InvalidInjection(String),

    #[error("invalid base url `{0}` (expected an absolute http:// or https:// URL)")]
    InvalidBaseUrl(String),

    #[error("invalid http header name `{0}`")]
    InvalidHeaderName(String),

    #[error("invalid http method `{0}`")]
    InvalidMethod(String),

    #[error("invalid assertion `{expression}`: {reason}")]
    InvalidAssertion { expression: String, reason: String },

    #[error("`max_concurrent_users` must be a positive integer")]
    InvalidMaxConcurrentUsers,

    #[error("`progress_interval` must be a positive duration")]
    InvalidProgressInterval,
}
