use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionClient, CompletionError, CompletionRequest};

/// Replays queued responses in order and records every request it receives.
/// Once the queue is empty every call fails with a transport error.
#[derive(Default)]
pub struct ScriptedCompletionClient {
    responses: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionClient {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<String, CompletionError>>,
    {
        Self { responses: Mutex::new(responses.into_iter().collect()), requests: Mutex::default() }
    }

    pub fn push_ok(&self, text: impl Into<String>) {
        self.push(Ok(text.into()));
    }

    pub fn push_err(&self, error: CompletionError) {
        self.push(Err(error));
    }

    fn push(&self, response: Result<String, CompletionError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|requests| requests.len()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|responses| responses.len()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.responses.lock().ok().and_then(|mut responses| responses.pop_front());
        next.unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".to_string())))
    }
}

/// Client for running without a completion service; every step degrades to its fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineCompletionClient;

#[async_trait]
impl CompletionClient for OfflineCompletionClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, CompletionError> {
        Err(CompletionError::Configuration("completion service disabled".to_string()))
    }
}
