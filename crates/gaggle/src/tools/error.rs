use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a tool executor.
///
/// These never abort a run: the engine turns them into error tool results the
/// model can read and react to.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Tool execution was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        ToolError::ExecutionError(format!("{err:#}"))
    }
}

pub type ToolResult<T> = Result<T, ToolError>;
