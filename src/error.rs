use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::JobState;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid transition for job {job}: {from} -> {to}")]
    InvalidTransition {
        job: String,
        from: JobState,
        to: JobState,
    },

    #[error("Comparison error: {0}")]
    Compare(#[from] CompareError),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Render error: {0}")]
    Render(#[from] askama::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors raised while diffing a computed result file against its baseline.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unable to open archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive {0} holds no result file")]
    EmptyArchive(PathBuf),

    #[error("{0} has no header row")]
    MissingHeader(PathBuf),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// How an execute worker's run ended, for log and report purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// Executor reported the test itself failed.
    Business,
    /// Executor could not run (error or panic).
    System,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Business => write!(f, "Business"),
            FailureKind::System => write!(f, "System"),
        }
    }
}
