//! Capability-level error taxonomy.
//!
//! Every tier converts its failures into [`CapabilityError`]; the orchestrator
//! records them as tier failures. Only [`RateLimited`] ever reaches a caller.

use std::time::Duration;

use medlink_llm::LlmError;
use thiserror::Error;

use crate::db::DbError;
use crate::drugs::DrugError;

/// A call arrived inside the throttle window for its endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limited on '{endpoint}', retry in {}ms", retry_after.as_millis())]
pub struct RateLimited {
    pub endpoint: String,
    pub retry_after: Duration,
}

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Upstream error (status {status:?}): {body}")]
    Upstream { status: Option<u16>, body: String },

    #[error("Invalid response: {0}")]
    Validation(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Unresolved drug name: {0}")]
    UnresolvedDrugName(String),
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

impl From<LlmError> for CapabilityError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::NetworkUnavailable(msg) => CapabilityError::NetworkUnavailable(msg),
            LlmError::Upstream { status, body } => CapabilityError::Upstream { status, body },
            LlmError::JsonParse(err) => CapabilityError::Validation(err.to_string()),
            LlmError::Validation(msg) => CapabilityError::Validation(msg),
            LlmError::Empty(source) => {
                CapabilityError::Validation(format!("empty response from {source}"))
            }
        }
    }
}

impl From<DbError> for CapabilityError {
    fn from(e: DbError) -> Self {
        CapabilityError::ToolExecution(e.to_string())
    }
}

impl From<DrugError> for CapabilityError {
    fn from(e: DrugError) -> Self {
        match e {
            DrugError::Unresolved(name) => CapabilityError::UnresolvedDrugName(name),
            other => CapabilityError::NetworkUnavailable(other.to_string()),
        }
    }
}
