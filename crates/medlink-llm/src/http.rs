//! HTTP implementations of the collaborator traits.
//!
//! - [`WorkflowClient`]: workflow webhooks (`POST {base}/{endpoint}`)
//! - [`OpenAiCompatClient`]: OpenAI-compatible `/chat/completions` and
//!   `/audio/transcriptions` (Groq and friends)
//! - [`GeminiClient`]: `models/{model}:generateContent` with inline image data

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{
    CompletionApi, CompletionRequest, MediaPayload, SpeechApi, VisionApi, WorkflowApi,
};
use crate::error::{LlmError, LlmResult};
use crate::normalizer::{detect_error_envelope, normalize, Normalized};

/// Build the shared HTTP client with a transport-level timeout.
pub fn build_http_client(timeout: Duration) -> LlmResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("medlink/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LlmError::NetworkUnavailable(format!("failed to build HTTP client: {e}")))
}

/// Read a response body, turning non-2xx statuses into [`LlmError::Upstream`].
async fn read_body(response: reqwest::Response) -> LlmResult<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(LlmError::upstream(Some(status.as_u16()), body));
    }
    Ok(body)
}

// =========================================================================
// Workflow backend
// =========================================================================

/// Client for the workflow engine's per-capability webhooks.
pub struct WorkflowClient {
    client: Client,
    base_url: String,
}

impl WorkflowClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl WorkflowApi for WorkflowClient {
    async fn invoke(&self, endpoint: &str, payload: Value) -> LlmResult<Value> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        debug!(%url, "invoking workflow endpoint");

        let response = self.client.post(&url).json(&payload).send().await?;
        let body = read_body(response).await?;
        if body.trim().is_empty() {
            return Err(LlmError::Empty("workflow"));
        }

        // Plain-text bodies are passed through as a JSON string.
        let value = match normalize::<Value>(&body, Value::String(body.trim().to_string())) {
            Normalized::UpstreamError { fault, .. } => return Err(fault.into()),
            other => other.into_value(),
        };
        // Arrays are returned as-is; a one-element array may still wrap an
        // error envelope.
        let envelope = match &value {
            Value::Array(items) if items.len() == 1 => &items[0],
            other => other,
        };
        if let Some(fault) = detect_error_envelope(envelope) {
            return Err(fault.into());
        }
        Ok(value)
    }
}

// =========================================================================
// OpenAI-compatible completion + transcription
// =========================================================================

/// OpenAI-compatible chat-completion and transcription client.
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    transcription_model: String,
}

impl OpenAiCompatClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        transcription_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            transcription_model: transcription_model.into(),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> LlmResult<reqwest::RequestBuilder> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Validation("completion API key is not configured".into()))?;
        Ok(builder.bearer_auth(key))
    }
}

#[async_trait]
impl CompletionApi for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request.model.unwrap_or_else(|| self.model.clone());

        let mut payload = json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature,
        });
        if request.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .authorized(self.client.post(&url))?
            .json(&payload)
            .send()
            .await?;
        let body: Value = serde_json::from_str(&read_body(response).await?)?;

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|msg| msg.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(LlmError::Empty("completion"));
        }
        Ok(content)
    }
}

#[async_trait]
impl SpeechApi for OpenAiCompatClient {
    async fn transcribe(&self, audio: &MediaPayload) -> LlmResult<String> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        let file_name = format!("audio.{}", audio.file_extension());
        let part = Part::bytes(audio.bytes.clone())
            .file_name(file_name)
            .mime_str(&audio.mime_type)
            .map_err(|e| LlmError::Validation(format!("invalid audio mime type: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.transcription_model.clone())
            .text("response_format", "json");

        let response = self
            .authorized(self.client.post(&url))?
            .multipart(form)
            .send()
            .await?;
        let body: Value = serde_json::from_str(&read_body(response).await?)?;

        let text = body
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(LlmError::Empty("transcription"));
        }
        Ok(text)
    }
}

// =========================================================================
// Gemini vision
// =========================================================================

/// Gemini `generateContent` client used for image understanding.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        }
    }
}

#[async_trait]
impl VisionApi for GeminiClient {
    async fn generate(&self, prompt: &str, image: &MediaPayload) -> LlmResult<String> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::Validation("vision API key is not configured".into()))?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let payload = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": image.mime_type, "data": image.to_base64() } }
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", key)])
            .json(&payload)
            .send()
            .await?;
        let body: Value = serde_json::from_str(&read_body(response).await?)?;
        if let Some(fault) = detect_error_envelope(&body) {
            return Err(fault.into());
        }

        let text: String = body
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::Empty("vision"));
        }
        Ok(text)
    }
}
