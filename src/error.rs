//! Error types for the workflow runner.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application.
///
/// Per-dataset failures (missing packs, unmatched channels, absent config files) are
/// reported as `Ok(false)` by the config modifiers and never reach this type; anything
/// surfacing here ends the whole run.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural problems inside a module config file
    #[error("config error: {message} (path: {path})")]
    Config { message: String, path: PathBuf },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Resource sample table could not be encoded or decoded
    #[error("resource table error: {0}")]
    Resource(#[from] bincode::Error),

    #[error("process error: {message}")]
    Process { message: String },

    #[error("chart error: {0}")]
    Chart(String),
}

impl WorkflowError {
    pub fn config(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        WorkflowError::Config {
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn process(message: impl Into<String>) -> Self {
        WorkflowError::Process {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
