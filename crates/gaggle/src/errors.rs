use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::generate::Step;

/// Every failure the engine can surface to a caller.
///
/// The enum is closed: callers branch on [`GenerateError::kind`] rather than
/// downcasting, and every variant is `Clone` so one failure can settle several
/// deferred aggregates of a streaming run.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GenerateError {
    #[error("Invalid argument for parameter {argument}: {message}")]
    InvalidArgument { argument: String, message: String },

    #[error("Model tried to call unavailable tool '{tool_name}'. {}", describe_available(.available_tools))]
    NoSuchTool {
        tool_name: String,
        available_tools: Option<Vec<String>>,
    },

    #[error("No such provider: {provider_id} (available providers: {})", .available_providers.join(","))]
    NoSuchProvider {
        provider_id: String,
        available_providers: Vec<String>,
    },

    #[error("Invalid response data: {message}")]
    InvalidResponseData { data: String, message: String },

    #[error("JSON parsing failed: Text: {text}. Error message: {message}")]
    JsonParse { text: String, message: String },

    #[error("Invalid data content: {message}")]
    InvalidDataContent { message: String },

    #[error("Failed to download {url}: {message}")]
    Download {
        url: String,
        status_code: Option<u16>,
        message: String,
    },

    #[error("API call failed: {message}")]
    ApiCall {
        message: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Failed after {attempts} attempts. Last error: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<GenerateError>,
    },

    #[error("Generation was cancelled")]
    Cancelled,
}

fn describe_available(tools: &Option<Vec<String>>) -> String {
    match tools {
        None => "No tools are available.".to_string(),
        Some(tools) => format!("Available tools: {}.", tools.join(", ")),
    }
}

/// Plain discriminant of a [`GenerateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NoSuchTool,
    NoSuchProvider,
    InvalidResponseData,
    JsonParse,
    InvalidDataContent,
    Download,
    ApiCall,
    Timeout,
    RetryExhausted,
    Cancelled,
}

impl GenerateError {
    pub fn invalid_argument<A: Into<String>, M: Into<String>>(argument: A, message: M) -> Self {
        GenerateError::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    pub fn json_parse<T: Into<String>>(text: T, err: &serde_json::Error) -> Self {
        GenerateError::JsonParse {
            text: text.into(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerateError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            GenerateError::NoSuchTool { .. } => ErrorKind::NoSuchTool,
            GenerateError::NoSuchProvider { .. } => ErrorKind::NoSuchProvider,
            GenerateError::InvalidResponseData { .. } => ErrorKind::InvalidResponseData,
            GenerateError::JsonParse { .. } => ErrorKind::JsonParse,
            GenerateError::InvalidDataContent { .. } => ErrorKind::InvalidDataContent,
            GenerateError::Download { .. } => ErrorKind::Download,
            GenerateError::ApiCall { .. } => ErrorKind::ApiCall,
            GenerateError::Timeout { .. } => ErrorKind::Timeout,
            GenerateError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            GenerateError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerateError::ApiCall { retryable, .. } => *retryable,
            GenerateError::Timeout { .. }
            | GenerateError::InvalidResponseData { .. }
            | GenerateError::JsonParse { .. }
            | GenerateError::Download { .. } => true,
            _ => false,
        }
    }
}

pub type GenerateResult<T> = Result<T, GenerateError>;

/// Where in a run a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    /// Opening or awaiting a provider call, including content downloads.
    ModelCall,
    /// Caller input, prompt shape and tool-name resolution.
    Validation,
    /// Tool executors were running.
    ToolExecution,
    /// Pulling events out of a provider stream.
    StreamConsumption,
}

/// A run that ended in the `Failed` state.
///
/// Keeps every step that completed before the failure.
#[derive(Error, Debug, Clone)]
#[error("generation failed during {stage}: {error}")]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub error: GenerateError,
    pub steps: Vec<Step>,
}

impl RunFailure {
    pub fn new(stage: Stage, error: GenerateError, steps: Vec<Step>) -> Self {
        Self {
            stage,
            error,
            steps,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}
