//! Streaming text generation
//!
//! Talks to an Ollama-compatible `/api/generate` endpoint and rebuilds one JSON
//! object from the streamed tokens, returning as soon as it closes.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::GenerationError;

pub mod client;
pub mod stream;
pub mod tracker;

/// Result of a streaming call that produced usable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A structurally closed top-level object.
    Completed(String),
    /// The stream ended or ran out of time before the object closed.
    Partial(String),
}

impl StreamOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Completed(text) | Self::Partial(text) => text,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        hard_timeout: Duration,
    ) -> Result<StreamOutcome, GenerationError>;
}
