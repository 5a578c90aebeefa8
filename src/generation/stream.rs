//! NDJSON fragment consumption under a wall-clock budget.

use std::{fmt::Display, time::Duration};

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use super::{tracker::DepthTracker, StreamOutcome};
use crate::errors::GenerationError;

/// One decoded line of the backend stream.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct StreamFragment {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Returns `None` for blank or malformed lines; those are skipped, not fatal.
pub fn parse_fragment(line: &[u8]) -> Option<StreamFragment> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

#[derive(Debug, Clone, Copy)]
pub struct StreamBudget {
    pub started: Instant,
    pub hard_timeout: Duration,
    pub read_timeout: Duration,
}

impl StreamBudget {
    pub fn starting_now(hard_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            hard_timeout,
            read_timeout,
        }
    }

    /// Time left before the hard timeout, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.hard_timeout.saturating_sub(self.started.elapsed())
    }

    /// How long the next read may wait, or `None` once the budget is spent.
    fn next_read_wait(&self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.hard_timeout {
            return None;
        }
        Some(self.read_timeout.min(self.hard_timeout - elapsed))
    }
}

enum Step {
    Continue,
    Completed(String),
    Finished,
}

#[derive(Default)]
struct Reconstruction {
    tracker: DepthTracker,
    fragments: usize,
    pending: Vec<u8>,
}

impl Reconstruction {
    fn accept(&mut self, fragment: StreamFragment) -> Result<Step, GenerationError> {
        self.fragments += 1;
        if let Some(message) = fragment.error {
            return Err(GenerationError::Stream(message));
        }
        if let Some(document) = self.tracker.feed_str(&fragment.response) {
            return Ok(Step::Completed(document));
        }
        if fragment.done {
            return Ok(Step::Finished);
        }
        Ok(Step::Continue)
    }

    fn push_chunk(&mut self, chunk: &[u8]) -> Result<Step, GenerationError> {
        self.pending.extend_from_slice(chunk);
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let Some(fragment) = parse_fragment(&line) else {
                continue;
            };
            match self.accept(fragment)? {
                Step::Continue => {}
                step => return Ok(step),
            }
        }
        Ok(Step::Continue)
    }

    /// The body may end without a final newline.
    fn flush_trailing_line(&mut self) -> Result<Step, GenerationError> {
        let line = std::mem::take(&mut self.pending);
        match parse_fragment(&line) {
            Some(fragment) => match self.accept(fragment)? {
                Step::Completed(document) => Ok(Step::Completed(document)),
                _ => Ok(Step::Finished),
            },
            None => Ok(Step::Finished),
        }
    }

    fn finish(self) -> Result<StreamOutcome, GenerationError> {
        if self.fragments == 0 {
            return Err(GenerationError::EmptyResponse);
        }
        let partial = self.tracker.into_partial();
        if partial.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        debug!(
            partial_len = partial.len(),
            "stream ended before the object closed"
        );
        Ok(StreamOutcome::Partial(partial))
    }

    fn time_out(self, elapsed: Duration) -> Result<StreamOutcome, GenerationError> {
        let partial = self.tracker.into_partial();
        warn!(
            elapsed_ms = elapsed.as_millis() as u64,
            partial_len = partial.len(),
            "generation stream hit its time budget"
        );
        if partial.trim().is_empty() {
            return Err(GenerationError::Timeout(elapsed));
        }
        Ok(StreamOutcome::Partial(partial))
    }
}

/// Reads byte chunks until the first top-level object closes, the backend
/// reports `done`, the body ends, or the budget runs out.
///
/// The budget is checked before every read and each read waits at most
/// `min(read_timeout, remaining)`, so a call overruns its budget by at most the
/// time it takes to process one chunk.
pub async fn consume_stream<S, B, E>(
    stream: S,
    budget: StreamBudget,
) -> Result<StreamOutcome, GenerationError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut state = Reconstruction::default();

    loop {
        let Some(wait) = budget.next_read_wait() else {
            return state.time_out(budget.started.elapsed());
        };

        let next = match timeout(wait, stream.next()).await {
            Ok(next) => next,
            Err(_) => return state.time_out(budget.started.elapsed()),
        };

        let step = match next {
            Some(Ok(chunk)) => state.push_chunk(chunk.as_ref())?,
            Some(Err(err)) => return Err(GenerationError::Transport(err.to_string())),
            None => state.flush_trailing_line()?,
        };

        match step {
            Step::Continue => {}
            Step::Completed(document) => return Ok(StreamOutcome::Completed(document)),
            Step::Finished => return state.finish(),
        }
    }
}
