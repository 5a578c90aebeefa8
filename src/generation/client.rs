//! Ollama streaming generation client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use super::{
    stream::{consume_stream, StreamBudget},
    StreamOutcome, TextGenerator,
};
use crate::errors::GenerationError;

const ERROR_BODY_TIMED_OUT: &str = "error body not received before the hard timeout";

/// Sampling options sent with every request. The defaults favour
/// deterministic, compact JSON output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    pub num_predict: i32,
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.1,
            top_k: 40,
            repeat_penalty: 1.05,
            num_predict: 1100,
            stop: vec!["```".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
    pub connect_timeout: Duration,
    /// Upper bound for a single read from the response body.
    pub read_timeout: Duration,
    /// Value for Ollama's `format` field; `None` leaves output unconstrained.
    pub format: Option<String>,
    pub keep_alive: String,
    pub options: GenerationOptions,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: String::new(),
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(20),
            format: Some("json".to_string()),
            keep_alive: "3m".to_string(),
            options: GenerationOptions::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    keep_alive: &'a str,
    options: &'a GenerationOptions,
}

/// Connects to an Ollama server and streams `/api/generate` output.
///
/// The inner [`Client`] pools connections and is shared by every handler.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    settings: OllamaSettings,
}

impl OllamaClient {
    pub fn new(settings: OllamaSettings) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        hard_timeout: Duration,
    ) -> Result<StreamOutcome, GenerationError> {
        let budget = StreamBudget::starting_now(hard_timeout, self.settings.read_timeout);
        let request = GenerateRequest {
            model: &self.settings.model,
            prompt,
            stream: true,
            format: self.settings.format.as_deref(),
            keep_alive: &self.settings.keep_alive,
            options: &self.settings.options,
        };

        debug!(
            model = %self.settings.model,
            prompt_len = prompt.len(),
            hard_timeout_ms = hard_timeout.as_millis() as u64,
            "sending streaming generation request"
        );

        let response = tokio::time::timeout(
            hard_timeout,
            self.client.post(self.generate_url()).json(&request).send(),
        )
        .await
        .map_err(|_| GenerationError::Timeout(hard_timeout))?
        .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match tokio::time::timeout(budget.remaining(), response.text()).await {
                Ok(Ok(body)) => body,
                Ok(Err(err)) => format!("unreadable error body: {err}"),
                Err(_) => ERROR_BODY_TIMED_OUT.to_string(),
            };
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let outcome = consume_stream(response.bytes_stream(), budget).await?;

        info!(
            model = %self.settings.model,
            completed = outcome.is_completed(),
            output_len = outcome.text().len(),
            elapsed_ms = budget.started.elapsed().as_millis() as u64,
            "generation stream finished"
        );

        Ok(outcome)
    }
}
