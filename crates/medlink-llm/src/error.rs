//! Errors raised by model-facing calls.

use thiserror::Error;

/// Errors from completion, vision, speech and workflow calls.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Upstream error (status {status:?}): {body}")]
    Upstream { status: Option<u16>, body: String },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    Validation(String),

    #[error("Empty response from {0}")]
    Empty(&'static str),
}

pub type LlmResult<T> = Result<T, LlmError>;

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => LlmError::Upstream {
                status: Some(status.as_u16()),
                body: e.to_string(),
            },
            None => LlmError::NetworkUnavailable(e.to_string()),
        }
    }
}

impl LlmError {
    /// Build an upstream error from a status code and (possibly long) body.
    pub fn upstream(status: Option<u16>, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > MAX_ERROR_BODY_CHARS {
            let cut = body
                .char_indices()
                .nth(MAX_ERROR_BODY_CHARS)
                .map(|(i, _)| i)
                .unwrap_or(body.len());
            body.truncate(cut);
        }
        LlmError::Upstream { status, body }
    }
}

const MAX_ERROR_BODY_CHARS: usize = 2_000;
