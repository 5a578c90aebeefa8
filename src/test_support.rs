//! Shared doubles for unit and end-to-end tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{body::Body, http::StatusCode, routing::post, Json, Router};
use futures::{stream, StreamExt};
use serde_json::Value;

use crate::errors::GenerationError;
use crate::generation::{StreamOutcome, TextGenerator};

pub struct MockBackend {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }
}

/// Serves `/api/generate` as a chunked NDJSON body made of `chunks`. With
/// `hang` set the body never ends after the last chunk.
pub async fn spawn_ndjson_backend(chunks: Vec<&'static str>, hang: bool) -> MockBackend {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);

    let app = Router::new().route(
        "/api/generate",
        post(move |Json(body): Json<Value>| {
            let chunks = chunks.clone();
            let recorded = Arc::clone(&recorded);
            async move {
                recorded.lock().expect("requests lock").push(body);
                let head = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
                if hang {
                    Body::from_stream(head.chain(stream::pending()))
                } else {
                    Body::from_stream(head)
                }
            }
        }),
    );

    serve_mock(app, requests).await
}

/// Answers `/api/generate` with `status` and a body made of `chunks`. With
/// `hang` set the body never ends.
pub async fn spawn_failing_backend(
    status: u16,
    chunks: Vec<&'static str>,
    hang: bool,
) -> MockBackend {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);
    let status = StatusCode::from_u16(status).expect("valid status");

    let app = Router::new().route(
        "/api/generate",
        post(move |Json(body): Json<Value>| {
            let chunks = chunks.clone();
            let recorded = Arc::clone(&recorded);
            async move {
                recorded.lock().expect("requests lock").push(body);
                let head = stream::iter(chunks.into_iter().map(Ok::<_, std::io::Error>));
                let body = if hang {
                    Body::from_stream(head.chain(stream::pending()))
                } else {
                    Body::from_stream(head)
                };
                (status, body)
            }
        }),
    );

    serve_mock(app, requests).await
}

async fn serve_mock(app: Router, requests: Arc<Mutex<Vec<Value>>>) -> MockBackend {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("mock backend addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend {
        base_url: format!("http://{addr}"),
        requests,
    }
}

/// Replays queued outcomes in order and records every prompt it receives.
#[derive(Default)]
pub struct ScriptedGenerator {
    outcomes: Mutex<VecDeque<Result<StreamOutcome, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(outcomes: Vec<Result<StreamOutcome, GenerationError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _hard_timeout: Duration,
    ) -> Result<StreamOutcome, GenerationError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .expect("outcomes lock")
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}
