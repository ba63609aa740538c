//! Vision adapter: one multimodal call per document or image question.

use std::sync::Arc;

use tracing::debug;

use crate::client::{MediaPayload, VisionApi};
use crate::error::{LlmError, LlmResult};
use crate::extraction::{parse_document, DocumentExtraction, DocumentType};
use crate::prompts::{document_prompt, image_question_prompt};

/// Wraps a [`VisionApi`] with input checks and document prompts.
#[derive(Clone)]
pub struct VisionAdapter {
    api: Arc<dyn VisionApi>,
}

impl VisionAdapter {
    pub fn new(api: Arc<dyn VisionApi>) -> Self {
        Self { api }
    }

    /// Run `prompt` against `image`. Empty images and blank output are errors.
    pub async fn analyze(&self, prompt: &str, image: &MediaPayload) -> LlmResult<String> {
        if image.is_empty() {
            return Err(LlmError::Validation("image payload is empty".into()));
        }
        debug!(mime = %image.mime_type, bytes = image.bytes.len(), "vision request");

        let text = self.api.generate(prompt, image).await?;
        if text.trim().is_empty() {
            return Err(LlmError::Empty("vision"));
        }
        Ok(text)
    }

    /// Answer a free-text question about an attached image.
    pub async fn answer_question(&self, query: &str, image: &MediaPayload) -> LlmResult<String> {
        self.analyze(&image_question_prompt(query), image).await
    }

    /// Extract structured data from a document image.
    pub async fn extract_document(
        &self,
        doc_type: DocumentType,
        image: &MediaPayload,
    ) -> LlmResult<DocumentExtraction> {
        let raw = self.analyze(document_prompt(doc_type), image).await?;
        parse_document(&raw)
    }
}
