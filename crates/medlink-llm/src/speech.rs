//! Speech adapter: transcription followed by intent classification.

use std::sync::Arc;

use tracing::debug;

use crate::client::{CompletionApi, CompletionRequest, MediaPayload, SpeechApi};
use crate::error::{LlmError, LlmResult};
use crate::extraction::{parse_voice_intent, VoiceIntent};
use crate::prompts::make_voice_intent_messages;

#[derive(Clone)]
pub struct SpeechAdapter {
    speech: Arc<dyn SpeechApi>,
    completion: Arc<dyn CompletionApi>,
}

impl SpeechAdapter {
    pub fn new(speech: Arc<dyn SpeechApi>, completion: Arc<dyn CompletionApi>) -> Self {
        Self { speech, completion }
    }

    /// Transcribe audio. Empty audio and blank transcripts are errors.
    pub async fn transcribe(&self, audio: &MediaPayload) -> LlmResult<String> {
        if audio.is_empty() {
            return Err(LlmError::Validation("audio payload is empty".into()));
        }
        let text = self.speech.transcribe(audio).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::Empty("speech"));
        }
        debug!(chars = text.len(), "transcribed voice command");
        Ok(text.to_string())
    }

    /// Decide add-stock vs search-stock and pull out (item, quantity) pairs.
    pub async fn classify(&self, transcript: &str) -> LlmResult<VoiceIntent> {
        let request = CompletionRequest::new(make_voice_intent_messages(transcript)).json();
        let raw = self.completion.complete(request).await?;
        let intent = parse_voice_intent(&raw)?;
        if intent.items.is_empty() {
            return Err(LlmError::Validation("no items recognised in voice command".into()));
        }
        Ok(intent)
    }
}
