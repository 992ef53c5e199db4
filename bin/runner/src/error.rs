//! Runner errors.

use rootcause::Report;
use std::fmt;
use std::path::PathBuf;
use weft_processed_data::RepositoryError;
use weft_workflow::{ExecutionError, HookError};

/// Errors that stop the runner before or while executing a workflow.
#[derive(Debug)]
pub enum RunnerError {
    /// A file could not be read.
    Read { path: PathBuf, reason: String },
    /// A file is not valid JSON of the expected shape.
    Parse { path: PathBuf, reason: String },
    /// The database URL names no supported backend.
    UnsupportedDatabase { url: String },
    /// The processed-data backend could not be opened.
    Backend(RepositoryError),
    /// The configured start node does not exist.
    StartNodeNotFound { name: String },
    /// Input items were given without a start node to receive them.
    MissingStartNode,
    /// A lifecycle hook rejected the workflow.
    Hook(Report<HookError>),
    /// The walker could not start the run.
    Execution(ExecutionError),
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, reason } => {
                write!(f, "failed to read '{}': {reason}", path.display())
            }
            Self::Parse { path, reason } => {
                write!(f, "failed to parse '{}': {reason}", path.display())
            }
            Self::UnsupportedDatabase { url } => {
                write!(f, "unsupported database url '{url}'")
            }
            Self::Backend(error) => write!(f, "processed-data backend: {error}"),
            Self::StartNodeNotFound { name } => write!(f, "start node '{name}' not found"),
            Self::MissingStartNode => write!(f, "input items need a start node"),
            Self::Hook(error) => write!(f, "{error}"),
            Self::Execution(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for RunnerError {}

impl From<RepositoryError> for RunnerError {
    fn from(error: RepositoryError) -> Self {
        Self::Backend(error)
    }
}

impl From<Report<HookError>> for RunnerError {
    fn from(error: Report<HookError>) -> Self {
        Self::Hook(error)
    }
}

impl From<ExecutionError> for RunnerError {
    fn from(error: ExecutionError) -> Self {
        Self::Execution(error)
    }
}
