//! In-process fakes for the collaborator traits.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use medlink_llm::{
    CompletionApi, CompletionRequest, LlmError, LlmResult, MediaPayload, SpeechApi, VisionApi,
    WorkflowApi,
};
use serde_json::Value;

fn offline() -> LlmError {
    LlmError::NetworkUnavailable("offline".into())
}

/// Replies in order; fails once the script runs out.
#[derive(Default)]
pub(crate) struct ScriptedCompletion {
    replies: Mutex<VecDeque<LlmResult<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub(crate) fn ok(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            ..Default::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self::default()
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionApi for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        self.requests.lock().unwrap().push(request);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Err(offline()))
    }
}

/// Per-endpoint canned responses; unknown endpoints are offline.
#[derive(Default)]
pub(crate) struct ScriptedWorkflow {
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedWorkflow {
    pub(crate) fn with(self, endpoint: &str, response: Value) -> Self {
        self.responses.lock().unwrap().insert(endpoint.to_string(), response);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowApi for ScriptedWorkflow {
    async fn invoke(&self, endpoint: &str, payload: Value) -> LlmResult<Value> {
        self.calls.lock().unwrap().push((endpoint.to_string(), payload));
        self.responses
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .ok_or_else(offline)
    }
}

pub(crate) struct FixedVision(pub Option<&'static str>);

#[async_trait]
impl VisionApi for FixedVision {
    async fn generate(&self, _prompt: &str, _image: &MediaPayload) -> LlmResult<String> {
        self.0.map(str::to_string).ok_or_else(offline)
    }
}

pub(crate) struct FixedSpeech(pub Option<&'static str>);

#[async_trait]
impl SpeechApi for FixedSpeech {
    async fn transcribe(&self, _audio: &MediaPayload) -> LlmResult<String> {
        self.0.map(str::to_string).ok_or_else(offline)
    }
}
