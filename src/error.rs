// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a cleaning invocation. Each variant is fatal to
/// the invocation it occurs in; none are retried.
#[derive(Error, Debug)]
pub enum CleanError {
    #[error("no raw file matching '{pattern}' found in {}", dir.display())]
    NotFound { dir: PathBuf, pattern: String },

    #[error("missing expected columns: {missing:?}. Got: {found:?}")]
    Schema {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("could not parse census year '{token}': {reason}")]
    Parse { token: String, reason: &'static str },

    #[error("unknown region labels encountered: {labels:?}")]
    UnmappedRegion { labels: Vec<String> },

    #[error("consistency check failed for `{dataset}`: {detail}")]
    Consistency { dataset: String, detail: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid source record on line {line}: {detail}")]
    Source { line: u64, detail: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl CleanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CleanError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        CleanError::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn consistency(dataset: &str, detail: impl Into<String>) -> Self {
        CleanError::Consistency {
            dataset: dataset.to_string(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;
