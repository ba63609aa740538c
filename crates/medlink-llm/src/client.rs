//! Collaborator interfaces for the hosted model APIs and the workflow backend.
//!
//! Each external service sits behind a small async trait so the orchestrator can
//! be exercised with in-process fakes. HTTP implementations live in
//! [`crate::http`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmResult;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the client's default model when set.
    pub model: Option<String>,
    /// Ask the backend for strict JSON output.
    pub json_mode: bool,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            json_mode: false,
            temperature: 0.3,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self.temperature = 0.1;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Inline binary payload (image or audio).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl MediaPayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self { bytes, mime_type: mime_type.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        B64_ENGINE.encode(&self.bytes)
    }

    /// File extension used when uploading as multipart.
    pub fn file_extension(&self) -> &str {
        match self.mime_type.as_str() {
            "audio/wav" | "audio/x-wav" => "wav",
            "audio/mpeg" | "audio/mp3" => "mp3",
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
            "audio/ogg" => "ogg",
            "audio/webm" => "webm",
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "application/pdf" => "pdf",
            _ => "bin",
        }
    }
}

/// Hosted language-model completion.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String>;
}

/// Hosted vision-capable model.
#[async_trait]
pub trait VisionApi: Send + Sync {
    async fn generate(&self, prompt: &str, image: &MediaPayload) -> LlmResult<String>;
}

/// Hosted speech transcription.
#[async_trait]
pub trait SpeechApi: Send + Sync {
    async fn transcribe(&self, audio: &MediaPayload) -> LlmResult<String>;
}

/// Workflow engine exposing one JSON endpoint per capability.
///
/// Implementations must reject both non-2xx responses and 2xx responses that
/// embed an error envelope.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn invoke(&self, endpoint: &str, payload: Value) -> LlmResult<Value>;
}
