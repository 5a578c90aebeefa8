use std::time::Duration;

use thiserror::Error;

/// Failures of a single streaming call to the generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend unreachable: {0}")]
    Transport(String),
    #[error("generation backend returned status {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("generation backend reported an error mid-stream: {0}")]
    Stream(String),
    #[error("generation backend returned an empty response")]
    EmptyResponse,
    #[error("generation stream timed out after {}ms with no usable output", .0.as_millis())]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("place search failed: {0}")]
    PlaceSearch(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("model output is not valid JSON after repair: {0}")]
    InvalidJson(String),
}

impl AppError {
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    pub fn place_search(message: impl Into<String>) -> Self {
        Self::PlaceSearch(message.into())
    }

    /// Short, stable label used in audit and connection log events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::PlaceSearch(_) => "place_search",
            Self::Generation(GenerationError::Timeout(_)) => "generation_timeout",
            Self::Generation(_) => "generation_failed",
            Self::InvalidJson(_) => "invalid_json",
        }
    }
}
